//! Synthetic NV12 camera: a scrolling checkerboard with a chroma gradient, pushed from its
//! own thread at a fixed rate. Stands in for a real capture session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use lens_api::{FramePlanes, FrameRef, FrameSink, FrameSource, PixelFormat, Plane, SourceError};

const CHECKER: u32 = 32;

pub struct SyntheticSource {
    width: u32,
    height: u32,
    fps: u32,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

/// Draw frame `index` into tightly packed Y and CbCr planes.
pub fn fill_nv12(index: u32, width: u32, height: u32, luma: &mut [u8], chroma: &mut [u8]) {
    for y in 0..height {
        for x in 0..width {
            let cell = (x.wrapping_add(index) / CHECKER + y / CHECKER) % 2;
            luma[(y * width + x) as usize] = if cell == 0 { 48 } else { 200 };
        }
    }
    let (cw, ch) = FramePlanes::chroma_size(width, height);
    for y in 0..ch {
        for x in 0..cw {
            let i = ((y * cw + x) * 2) as usize;
            chroma[i] = (x * 255 / cw.max(1)) as u8;
            chroma[i + 1] = (y * 255 / ch.max(1)) as u8;
        }
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), SourceError> {
        if self.is_running() {
            return Err(SourceError::Start("synthetic source already running".into()));
        }
        if self.width == 0 || self.height == 0 || self.fps == 0 {
            return Err(SourceError::Start(format!(
                "invalid synthetic mode {}x{}@{}",
                self.width, self.height, self.fps
            )));
        }
        let (width, height) = (self.width, self.height);
        let interval = Duration::from_secs(1) / self.fps;
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        let worker = thread::Builder::new()
            .name("synthetic-camera".into())
            .spawn(move || {
                let (cw, ch) = FramePlanes::chroma_size(width, height);
                let mut luma = vec![0u8; (width * height) as usize];
                let mut chroma = vec![0u8; (cw * ch * 2) as usize];
                let mut index = 0u32;
                while running.load(Ordering::Acquire) {
                    fill_nv12(index, width, height, &mut luma, &mut chroma);
                    let planes = [Plane::new(&luma, width as usize), Plane::new(&chroma, (cw * 2) as usize)];
                    sink.on_frame(FrameRef::new(width, height, PixelFormat::Nv12, &planes));
                    index = index.wrapping_add(2);
                    thread::sleep(interval);
                }
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                SourceError::Start(e.to_string())
            })?;
        self.worker = Some(worker);
        log::info!("synthetic camera started: {}x{} @ {} fps", self.width, self.height, self.fps);
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("synthetic camera thread panicked");
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for SyntheticSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gravlens_bridge::FrameSlot;

    #[test]
    fn pushes_valid_frames_until_stopped() {
        let slot = Arc::new(FrameSlot::new());
        let mut source = SyntheticSource::new(64, 48, 500);
        source.start(slot.clone()).unwrap();
        assert!(source.start(slot.clone()).is_err());
        while slot.stats().delivered < 3 {
            thread::sleep(Duration::from_millis(1));
        }
        source.stop();
        assert!(!source.is_running());

        let frame = slot.take_latest().unwrap();
        assert!(frame.validate().is_ok());
        assert_eq!(slot.stats().rejected, 0);
    }

    #[test]
    fn zero_rate_is_refused() {
        let mut source = SyntheticSource::new(64, 48, 0);
        assert!(matches!(source.start(Arc::new(FrameSlot::new())), Err(SourceError::Start(_))));
    }
}
