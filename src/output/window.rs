use super::PresentationSurface;
use crate::frame::CompositedFrame;
use softbuffer::{Context, SoftBufferError, Surface};
use std::num::NonZeroU32;
use std::sync::Arc;
use winit::window::Window;

struct Pixels {
    width: u32,
    height: u32,
    words: Vec<u32>,
}

/// Transparent winit window drawn through softbuffer.
///
/// Frames are stored as premultiplied ARGB words and blitted on redraw, so the
/// last presented frame survives skipped ticks and expose events.
pub struct OverlaySurface {
    window: Arc<Window>,
    surface: Surface<Arc<Window>, Arc<Window>>,
    // the surface is only valid while its context lives
    _context: Context<Arc<Window>>,
    last: Option<Pixels>,
}

impl OverlaySurface {
    pub fn new(window: Arc<Window>) -> Result<Self, SoftBufferError> {
        let context = Context::new(Arc::clone(&window))?;
        let surface = Surface::new(&context, Arc::clone(&window))?;
        Ok(Self {
            window,
            surface,
            _context: context,
            last: None,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Blit the last presented frame into the window.
    pub fn redraw(&mut self) -> Result<(), SoftBufferError> {
        let (width, height) = self.current_size();
        let (Some(w), Some(h)) = (NonZeroU32::new(width), NonZeroU32::new(height)) else {
            return Ok(());
        };

        self.surface.resize(w, h)?;
        let mut buffer = self.surface.buffer_mut()?;
        match &self.last {
            Some(pixels) => blit(&mut buffer, width, height, pixels),
            None => buffer.fill(0),
        }
        buffer.present()
    }
}

impl PresentationSurface for OverlaySurface {
    fn present(&mut self, image: CompositedFrame) {
        self.last = Some(Pixels {
            width: image.width(),
            height: image.height(),
            words: image.to_argb_words(),
        });
        self.window.request_redraw();
    }

    fn current_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

/// Copy the overlapping region of `src` into a `width` x `height` buffer and
/// clear the rest to transparent.
fn blit(dst: &mut [u32], width: u32, height: u32, src: &Pixels) {
    dst.fill(0);
    let cols = width.min(src.width) as usize;
    let rows = height.min(src.height) as usize;
    for y in 0..rows {
        let d = y * width as usize;
        let s = y * src.width as usize;
        dst[d..d + cols].copy_from_slice(&src.words[s..s + cols]);
    }
}
