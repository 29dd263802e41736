use crate::capture::CaptureSource;
use crate::config::OverlayConfig;
use crate::output::{OverlaySurface, WindowState};
use crate::pipeline::{FrameClock, Pipeline, TickOutcome};
use anyhow::anyhow;
use std::sync::Arc;
use std::time::Instant;
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalPosition, LogicalSize, PhysicalPosition};
use winit::event::{ElementState, KeyEvent, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow};
use winit::keyboard::{Key, NamedKey};
use winit::window::{WindowAttributes, WindowId, WindowLevel};

/// winit glue: owns the window, drives the frame clock, and forwards ticks to
/// the pipeline.
pub struct OverlayApp<C: CaptureSource> {
    pipeline: Pipeline<C>,
    clock: FrameClock,
    surface: Option<OverlaySurface>,
    state: WindowState,
    cursor: (f64, f64),
    size: u32,
    error: Option<anyhow::Error>,
    shut_down: bool,
}

impl<C: CaptureSource> OverlayApp<C> {
    pub fn new(pipeline: Pipeline<C>, config: &OverlayConfig) -> Self {
        let clock = FrameClock::new(config.fps, Instant::now());
        tracing::info!("Ticking every {:?} ({} fps)", clock.period(), config.fps);
        Self {
            pipeline,
            clock,
            surface: None,
            state: WindowState::new(config.position, (config.size, config.size)),
            cursor: (0.0, 0.0),
            size: config.size,
            error: None,
            shut_down: false,
        }
    }

    /// Error that ended the event loop, if any.
    pub fn take_error(&mut self) -> Option<anyhow::Error> {
        self.error.take()
    }

    fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.clock.stop();
        self.pipeline.shutdown();
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        self.shutdown();
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        tracing::error!("{:#}", error);
        self.error = Some(error);
        self.exit(event_loop);
    }

    fn run_tick(&mut self, event_loop: &ActiveEventLoop) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        match self.pipeline.tick(surface) {
            Ok(TickOutcome::Presented { degraded: true }) => tracing::trace!("Presented unmasked"),
            Ok(TickOutcome::Presented { degraded: false }) => {}
            Ok(TickOutcome::Skipped(reason)) => tracing::trace!("Skipped: {:?}", reason),
            Err(e) => self.fail(event_loop, e.into()),
        }
    }

    fn begin_drag(&mut self) {
        let Some(surface) = &self.surface else {
            return;
        };
        // let the window manager move the window when it can
        if let Err(e) = surface.window().drag_window() {
            tracing::debug!("Window manager drag unavailable ({}), moving manually", e);
            self.state.begin_drag(self.cursor);
        }
    }

    fn drag_to(&mut self, cursor: (f64, f64)) {
        self.cursor = cursor;
        if let (Some(position), Some(surface)) = (self.state.drag_to(cursor), &self.surface) {
            surface
                .window()
                .set_outer_position(PhysicalPosition::new(position.0, position.1));
        }
    }
}

impl<C: CaptureSource> ApplicationHandler for OverlayApp<C> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.surface.is_some() {
            return;
        }

        let (x, y) = self.state.position();
        let attributes = WindowAttributes::default()
            .with_title("bubblecam")
            .with_transparent(true)
            .with_decorations(false)
            .with_window_level(WindowLevel::AlwaysOnTop)
            .with_inner_size(LogicalSize::new(self.size as f64, self.size as f64))
            .with_position(LogicalPosition::new(x as f64, y as f64));

        let window = match event_loop.create_window(attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fail(event_loop, anyhow!("Failed to create overlay window: {e}"));
                return;
            }
        };

        match OverlaySurface::new(window) {
            Ok(surface) => {
                tracing::info!("Overlay window ready, press Esc or Q to quit");
                self.surface = Some(surface);
            }
            Err(e) => self.fail(event_loop, anyhow!("Failed to create drawing surface: {e}")),
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.exit(event_loop),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key,
                        state: ElementState::Pressed,
                        ..
                    },
                ..
            } => match logical_key.as_ref() {
                Key::Named(NamedKey::Escape) | Key::Character("q") | Key::Character("Q") => {
                    self.exit(event_loop)
                }
                _ => {}
            },
            WindowEvent::MouseInput {
                state,
                button: MouseButton::Left,
                ..
            } => match state {
                ElementState::Pressed => self.begin_drag(),
                ElementState::Released if self.state.is_dragging() => {
                    self.state.end_drag();
                    tracing::debug!("Window dropped at {:?}", self.state.position());
                }
                ElementState::Released => {}
            },
            WindowEvent::CursorMoved { position, .. } => self.drag_to((position.x, position.y)),
            WindowEvent::Moved(position) => self.state.set_position((position.x, position.y)),
            WindowEvent::Resized(size) => {
                if self.state.size() != (size.width, size.height) {
                    tracing::debug!("Window resized to {}x{}", size.width, size.height);
                }
                self.state.set_size((size.width, size.height));
                if let Some(surface) = &self.surface {
                    surface.window().request_redraw();
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(surface) = &mut self.surface {
                    if let Err(e) = surface.redraw() {
                        tracing::warn!("Redraw failed: {}", e);
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        if self.clock.is_due(now) {
            self.run_tick(event_loop);
            self.clock.advance(now);
        }

        if self.clock.is_running() {
            event_loop.set_control_flow(ControlFlow::WaitUntil(self.clock.next_deadline()));
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
