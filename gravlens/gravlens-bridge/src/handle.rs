//! Shared, lockable render loop for hosts that signal lifecycle from another thread.

use std::sync::Arc;

use gravlens_renderer::GpuDevice;
use lens_api::Lifecycle;
use parking_lot::{Mutex, MutexGuard};

use crate::render_loop::{RenderError, RenderLoop, TickOutcome};

/// Lifecycle calls and ticks take the same lock, so teardown never overlaps a draw.
pub struct RenderHandle<D: GpuDevice> {
    inner: Arc<Mutex<RenderLoop<D>>>,
}

impl<D: GpuDevice> Clone for RenderHandle<D> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<D: GpuDevice> RenderHandle<D> {
    pub fn new(render_loop: RenderLoop<D>) -> Self {
        Self { inner: Arc::new(Mutex::new(render_loop)) }
    }

    pub fn lock(&self) -> MutexGuard<'_, RenderLoop<D>> {
        self.inner.lock()
    }

    pub fn tick(&self) -> Result<TickOutcome, RenderError> {
        self.inner.lock().tick()
    }
}

impl<D: GpuDevice> Lifecycle for RenderHandle<D>
where
    RenderLoop<D>: Send,
{
    fn suspend(&self) {
        self.inner.lock().suspend();
    }

    fn resume(&self) {
        self.inner.lock().resume();
    }

    fn shutdown(&self) {
        self.inner.lock().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_slot::FrameSlot;
    use crate::lens_input::LensInput;
    use crate::render_loop::LoopState;
    use gravlens_renderer::{HeadlessDevice, LensConfig, ShaderSources};

    #[test]
    fn lifecycle_from_another_thread() {
        let mut render_loop =
            RenderLoop::new(HeadlessDevice::new(), &LensConfig::default(), Arc::new(LensInput::default()), 64, 48)
                .unwrap();
        render_loop.attach_source(Arc::new(FrameSlot::new()));
        render_loop.initialize(ShaderSources::builtin()).unwrap();
        let handle = RenderHandle::new(render_loop);

        let remote = handle.clone();
        std::thread::spawn(move || remote.suspend()).join().unwrap();
        assert_eq!(handle.lock().state(), LoopState::Suspended);
        assert_eq!(handle.tick(), Ok(TickOutcome::Idle));

        handle.resume();
        assert_eq!(handle.tick(), Ok(TickOutcome::NoFrame));
        handle.shutdown();
        assert_eq!(handle.lock().pipeline().device().counts().total(), 0);
    }
}
