use crate::mask::FeatherCurve;
use crate::pipeline::{frame_budget, PipelineConfig};
use crate::segmentation::TensorLayout;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Parser, Debug)]
#[command(author, version, about = "Circular, background-removed webcam overlay", long_about = None)]
pub struct Args {
    /// Webcam device index (probes 0, 1, 2 when omitted)
    #[arg(short, long)]
    pub device: Option<u32>,

    /// List available cameras and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Overlay window size in logical pixels
    #[arg(long, default_value_t = 250)]
    pub size: u32,

    /// Target frames per second
    #[arg(long, default_value_t = 60)]
    pub fps: u32,

    /// Path to the selfie segmentation model (ONNX file)
    /// If missing, runs without background removal
    #[arg(long, default_value = "selfie_segmenter.onnx")]
    pub model: PathBuf,

    /// Disable background removal even if the model is present
    #[arg(long)]
    pub no_segmentation: bool,

    /// Square input resolution of the segmentation model
    #[arg(long, default_value_t = 256)]
    pub model_input_size: u32,

    /// Input tensor layout of the segmentation model
    #[arg(long, value_enum, default_value_t = TensorLayout::Nhwc)]
    pub model_layout: TensorLayout,

    /// Use the raw model confidence instead of the cleaned mask
    /// (threshold, erode, close, blur)
    #[arg(long)]
    pub no_refine_mask: bool,

    /// Opaque radius as a fraction of half the shorter window side
    #[arg(long, default_value_t = 0.97)]
    pub inner_radius: f32,

    /// Feather band width as a fraction of half the shorter window side
    #[arg(long, default_value_t = 0.03)]
    pub feather: f32,

    /// Falloff across the feather band
    #[arg(long, value_enum, default_value_t = FeatherCurve::Linear)]
    pub feather_curve: FeatherCurve,

    /// Capture timeout in milliseconds (defaults to one frame period)
    #[arg(long)]
    pub capture_timeout_ms: Option<u64>,

    /// Consecutive failed ticks before giving up (0 = never)
    #[arg(long, default_value_t = 120)]
    pub max_consecutive_failures: u32,

    /// Log timing statistics every N frames
    #[arg(long, default_value_t = 60)]
    pub stats_every: u64,

    /// Initial window x position
    #[arg(long, default_value_t = 50)]
    pub x: i32,

    /// Initial window y position
    #[arg(long, default_value_t = 50)]
    pub y: i32,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("--size must be at least 1 pixel")]
    Size,
    #[error("--fps must be between 1 and 240, got {0}")]
    Fps(u32),
    #[error("--inner-radius must be in [0, 1], got {0}")]
    InnerRadius(f32),
    #[error("--feather must be in [0, 1], got {0}")]
    Feather(f32),
    #[error("--model-input-size must be at least 1 pixel")]
    ModelInputSize,
}

/// Validated runtime settings.
#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub device: Option<u32>,
    pub size: u32,
    pub position: (i32, i32),
    pub fps: u32,
    pub model: Option<PathBuf>,
    pub model_input_size: u32,
    pub model_layout: TensorLayout,
    pub refine_mask: bool,
    pub inner_radius: f32,
    pub feather: f32,
    pub feather_curve: FeatherCurve,
    pub capture_timeout: Duration,
    pub pipeline: PipelineConfig,
}

impl OverlayConfig {
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        if args.size == 0 {
            return Err(ConfigError::Size);
        }
        if !(1..=240).contains(&args.fps) {
            return Err(ConfigError::Fps(args.fps));
        }
        if !(0.0..=1.0).contains(&args.inner_radius) {
            return Err(ConfigError::InnerRadius(args.inner_radius));
        }
        if !(0.0..=1.0).contains(&args.feather) {
            return Err(ConfigError::Feather(args.feather));
        }
        if args.model_input_size == 0 {
            return Err(ConfigError::ModelInputSize);
        }

        let capture_timeout = args
            .capture_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| frame_budget(args.fps));

        Ok(Self {
            device: args.device,
            size: args.size,
            position: (args.x, args.y),
            fps: args.fps,
            model: (!args.no_segmentation).then(|| args.model.clone()),
            model_input_size: args.model_input_size,
            model_layout: args.model_layout,
            refine_mask: !args.no_refine_mask,
            inner_radius: args.inner_radius,
            feather: args.feather,
            feather_curve: args.feather_curve,
            capture_timeout,
            pipeline: PipelineConfig {
                max_consecutive_failures: args.max_consecutive_failures,
                stats_every: args.stats_every,
            },
        })
    }
}
