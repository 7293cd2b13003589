//! Live lens over a synthetic camera feed. The lens follows the cursor, the wheel changes
//! its radius, losing focus suspends rendering.
//! Run: cargo run -p debug --bin lens_window

use std::sync::Arc;

use debug::synthetic::SyntheticSource;
use gravlens_bridge::{FrameSlot, LensInput, LensWindowBackend};
use gravlens_renderer::LensConfig;
use lens_api::{FrameSource, LensBackendWindow, LensControl, Lifecycle};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::application::ApplicationHandler;
use winit::event::{MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::window::WindowId;

struct App {
    window: Option<winit::window::Window>,
    backend: Option<LensWindowBackend>,
    camera: SyntheticSource,
    slot: Arc<FrameSlot>,
    lens: Arc<LensInput>,
    config: LensConfig,
    size: (u32, u32),
    cursor: (f32, f32),
    radius: f32,
}

impl App {
    fn new() -> Self {
        let config = LensConfig::from_env();
        Self {
            window: None,
            backend: None,
            camera: SyntheticSource::new(1280, 720, 30),
            slot: Arc::new(FrameSlot::new()),
            lens: Arc::new(LensInput::default()),
            radius: config.default_lens_radius,
            config,
            size: (800, 600),
            cursor: (400.0, 300.0),
        }
    }

    fn move_lens(&self) {
        let (x, y) = self.cursor;
        if let Err(e) = self.lens.set_lens_params(x, y, self.radius, self.config.default_lens_strength) {
            log::warn!("lens update rejected: {e}");
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let attrs = winit::window::WindowAttributes::default()
            .with_title("GravLens")
            .with_inner_size(winit::dpi::LogicalSize::new(800, 600));
        let window = event_loop.create_window(attrs).expect("create window");
        let phys = window.inner_size();
        self.size = (phys.width.max(1), phys.height.max(1));
        if !self.camera.is_running() {
            if let Err(e) = self.camera.start(self.slot.clone()) {
                eprintln!("synthetic camera failed to start: {e}");
            }
        }
        window.request_redraw();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(backend) = &self.backend {
                    backend.handle().shutdown();
                }
                self.camera.stop();
                event_loop.exit();
            }
            WindowEvent::Resized(physical) => {
                self.size = (physical.width.max(1), physical.height.max(1));
                if let Some(backend) = &mut self.backend {
                    if let Err(e) = backend.resize(self.size.0, self.size.1) {
                        log::warn!("resize failed: {e}");
                    }
                }
            }
            WindowEvent::Focused(focused) => {
                if let Some(backend) = &self.backend {
                    if focused {
                        backend.handle().resume();
                    } else {
                        backend.handle().suspend();
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = (position.x as f32, position.y as f32);
                self.move_lens();
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let step = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y * 10.0,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
                self.radius = (self.radius + step).clamp(0.0, 1000.0);
                self.move_lens();
            }
            WindowEvent::RedrawRequested => {
                let window = match &self.window {
                    Some(w) => w,
                    None => return,
                };
                if self.backend.is_none() {
                    match LensWindowBackend::from_window(
                        window,
                        self.size,
                        self.config.clone(),
                        Arc::clone(&self.slot),
                        Arc::clone(&self.lens),
                    ) {
                        Ok(backend) => self.backend = Some(backend),
                        Err(e) => {
                            eprintln!("LensWindowBackend::from_window failed: {}", e);
                            return;
                        }
                    }
                }
                let (raw_window, raw_display) = match (window.window_handle(), window.display_handle()) {
                    (Ok(wh), Ok(dh)) => (wh.as_raw(), dh.as_raw()),
                    _ => return,
                };
                if let Some(backend) = &mut self.backend {
                    if let Err(e) = backend.render_to_window(raw_window, raw_display, self.size) {
                        log::error!("render_to_window: {e}");
                    }
                }
                window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() -> Result<(), String> {
    env_logger::init();
    let event_loop = winit::event_loop::EventLoop::new().map_err(|e| e.to_string())?;
    let mut app = App::new();
    event_loop.run_app(&mut app).map_err(|e| e.to_string())?;
    Ok(())
}
