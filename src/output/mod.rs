mod drag;
mod window;

pub use drag::WindowState;
pub use window::OverlaySurface;

use crate::frame::CompositedFrame;

/// Trait for presentation destinations
pub trait PresentationSurface {
    /// Show a composited frame. The surface keeps showing it until the next
    /// call.
    fn present(&mut self, image: CompositedFrame);

    /// Current drawable size in pixels. A change means the circular mask must
    /// be regenerated.
    fn current_size(&self) -> (u32, u32);
}
