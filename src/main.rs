mod app;
mod capture;
mod compositor;
mod config;
mod frame;
mod mask;
mod output;
mod pipeline;
mod segmentation;

use anyhow::{Context, Result};
use app::OverlayApp;
use capture::CaptureSource;
use clap::Parser;
use config::{Args, OverlayConfig};
use mask::{MaskCache, MaskGenerator};
use pipeline::Pipeline;
use winit::event_loop::EventLoop;

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if args.list_devices {
        for (index, name) in capture::list_devices()? {
            println!("{index}: {name}");
        }
        return Ok(());
    }

    let config = OverlayConfig::from_args(&args)?;

    tracing::info!("bubblecam starting");
    tracing::info!("Window: {}x{} at {:?}", config.size, config.size, config.position);
    tracing::info!("Target FPS: {}", config.fps);

    // Initialize capture
    let capture = match config.device {
        Some(index) => capture::open_webcam(index, config.capture_timeout),
        None => capture::open_first_available(config.capture_timeout),
    }
    .context("Failed to open camera")?;
    let (capture_width, capture_height) = capture.resolution();
    tracing::info!("Capture: {}x{}", capture_width, capture_height);

    // Initialize segmentation model if available
    let engine = match &config.model {
        Some(model_path) => segmentation::create_engine(
            model_path,
            config.model_input_size,
            config.model_layout,
            config.refine_mask,
        )
        .unwrap_or_else(|e| {
            tracing::warn!(
                "Segmentation model failed to load ({:#}), background removal disabled",
                e
            );
            None
        }),
        None => None,
    };

    let masks = MaskCache::new(
        MaskGenerator::new(config.feather_curve),
        config.inner_radius,
        config.feather,
    );
    let pipeline = Pipeline::new(capture, engine, masks, config.pipeline);

    // Main loop
    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = OverlayApp::new(pipeline, &config);
    event_loop
        .run_app(&mut app)
        .context("Event loop terminated abnormally")?;

    if let Some(error) = app.take_error() {
        return Err(error);
    }

    tracing::info!("bubblecam stopped");
    Ok(())
}
