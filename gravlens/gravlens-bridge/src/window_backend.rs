//! Window-capable backend: created from a window, draws the lens mesh into its swapchain.

use std::sync::Arc;

use gravlens_renderer::{LensConfig, ShaderSources, WgpuDevice};
use lens_api::LensBackendWindow;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle};
use wgpu::SurfaceTargetUnsafe;

use crate::frame_slot::FrameSlot;
use crate::handle::RenderHandle;
use crate::lens_input::LensInput;
use crate::render_loop::{RenderError, RenderLoop, TickOutcome};

/// Owns the wgpu instance and adapter plus a render loop over a `WgpuDevice`.
/// The surface is recreated each frame from the raw handles the host passes in.
pub struct LensWindowBackend {
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    config: LensConfig,
    handle: RenderHandle<WgpuDevice>,
}

impl LensWindowBackend {
    /// Create the backend from a window (e.g. winit). The window is used for its raw handles
    /// and an initial surface for adapter selection; the host keeps it alive.
    pub fn from_window(
        window: &(impl HasWindowHandle + HasDisplayHandle),
        size: (u32, u32),
        config: LensConfig,
        slot: Arc<FrameSlot>,
        lens: Arc<LensInput>,
    ) -> Result<Self, String> {
        let (raw_window, raw_display) = {
            let wh = window.window_handle().map_err(|e| e.to_string())?;
            let dh = window.display_handle().map_err(|e| e.to_string())?;
            (wh.as_raw(), dh.as_raw())
        };
        pollster::block_on(Self::from_raw_handles_async(raw_window, raw_display, size, config, slot, lens))
    }

    async fn from_raw_handles_async(
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
        size: (u32, u32),
        mut config: LensConfig,
        slot: Arc<FrameSlot>,
        lens: Arc<LensInput>,
    ) -> Result<Self, String> {
        let instance = wgpu::Instance::default();
        let target = SurfaceTargetUnsafe::RawHandle {
            raw_window_handle,
            raw_display_handle,
        };
        let surface = unsafe { instance.create_surface_unsafe(target).map_err(|e| e.to_string())? };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or("No adapter")?;
        let info = adapter.get_info();
        log::info!("adapter: {} ({:?})", info.name, info.backend);

        // Shader output is already gamma encoded: non-sRGB swapchain.
        let caps = surface.get_capabilities(&adapter);
        config.swapchain_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .unwrap_or(config.swapchain_format);
        drop(surface);

        let device = Self::request_device(&adapter, &config).await?;
        let mut render_loop =
            RenderLoop::new(device, &config, lens, size.0.max(1), size.1.max(1)).map_err(|e| e.to_string())?;
        render_loop.attach_source(slot);
        render_loop.initialize(ShaderSources::builtin()).map_err(|e| e.to_string())?;
        Ok(Self { instance, adapter, config, handle: RenderHandle::new(render_loop) })
    }

    async fn request_device(adapter: &wgpu::Adapter, config: &LensConfig) -> Result<WgpuDevice, String> {
        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gravlens_device"),
                    ..Default::default()
                },
                None,
            )
            .await
            .map_err(|e| e.to_string())?;
        log::info!("device ready, swapchain format {:?}", config.swapchain_format);
        Ok(WgpuDevice::new(device, queue, config))
    }

    /// Shared handle for lifecycle signals from other threads.
    pub fn handle(&self) -> RenderHandle<WgpuDevice> {
        self.handle.clone()
    }

    fn surface_config(format: wgpu::TextureFormat, width: u32, height: u32) -> wgpu::SurfaceConfiguration {
        wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width,
            height,
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Opaque,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        }
    }

    /// Request a fresh device after loss and rebuild the program on it.
    fn replace_lost_device(&self, render_loop: &mut RenderLoop<WgpuDevice>) -> Result<(), String> {
        log::warn!("requesting a new device after device loss");
        let device = pollster::block_on(Self::request_device(&self.adapter, &self.config))?;
        render_loop.reinitialize_with(device).map_err(|e| e.to_string())
    }
}

impl LensBackendWindow for LensWindowBackend {
    fn render_to_window(
        &mut self,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
        size: (u32, u32),
    ) -> Result<bool, String> {
        let mut render_loop = self.handle.lock();
        if render_loop.pipeline().device().is_lost() {
            self.replace_lost_device(&mut render_loop)?;
        }

        let target = SurfaceTargetUnsafe::RawHandle {
            raw_window_handle,
            raw_display_handle,
        };
        let surface = unsafe {
            self.instance
                .create_surface_unsafe(target)
                .map_err(|e| e.to_string())?
        };
        let (width, height) = size;
        let config = Self::surface_config(self.config.swapchain_format, width.max(1), height.max(1));
        surface.configure(render_loop.pipeline().device().device(), &config);

        let frame = match surface.get_current_texture() {
            Ok(f) => f,
            Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                log::warn!("surface outdated, reconfiguring");
                surface.configure(render_loop.pipeline().device().device(), &config);
                surface.get_current_texture().map_err(|e| e.to_string())?
            }
            Err(wgpu::SurfaceError::Timeout) => return Err("Surface get_current_texture timeout".to_string()),
            Err(e) => return Err(e.to_string()),
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        render_loop.pipeline_mut().device_mut().begin_frame(view);
        let outcome = render_loop.tick();
        render_loop.pipeline_mut().device_mut().end_frame();

        match outcome {
            Ok(TickOutcome::Drawn) => {
                frame.present();
                Ok(true)
            }
            // Dropping the surface texture without presenting discards it.
            Ok(_) => Ok(false),
            Err(RenderError::ContextLost(reason)) => {
                drop(frame);
                log::warn!("device lost mid-frame: {reason}");
                self.replace_lost_device(&mut render_loop)?;
                Ok(false)
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<(), String> {
        self.handle.lock().resize_screen(width, height).map_err(|e| e.to_string())
    }
}
