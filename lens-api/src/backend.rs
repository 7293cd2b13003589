//! Traits the host talks to: lens placement, lifecycle signals and window presentation.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::ConfigError;

/// Input side: the gesture/UI layer moves the lensing object through this.
/// Implementations must be callable from any thread.
pub trait LensControl: Send + Sync {
    fn set_lens_params(&self, center_x: f32, center_y: f32, radius: f32, strength: f32) -> Result<(), ConfigError>;
}

/// Platform lifecycle signals. Safe to call from the UI thread while a draw is in flight.
pub trait Lifecycle: Send + Sync {
    /// Stop drawing (backgrounded, camera interrupted). GPU resources are kept.
    fn suspend(&self);
    fn resume(&self);
    /// Release every GPU object. The backend has to be initialized again before it draws.
    fn shutdown(&self);
}

/// Backend that owns its surface and presents to a window identified by raw handles.
pub trait LensBackendWindow: Send {
    /// Draw the latest frame and present. Returns `Ok(false)` when there was nothing new to draw.
    fn render_to_window(
        &mut self,
        raw_window_handle: RawWindowHandle,
        raw_display_handle: RawDisplayHandle,
        size: (u32, u32),
    ) -> Result<bool, String>;

    /// Screen rotated or window resized.
    fn resize(&mut self, width: u32, height: u32) -> Result<(), String>;
}
