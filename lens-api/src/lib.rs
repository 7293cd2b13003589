//! Shared GravLens API.
//! Screen/lens parameters, frame handoff types and the control/lifecycle traits the host
//! uses without touching the renderer directly.

mod backend;
mod frame;
mod lens;

pub use backend::{LensBackendWindow, LensControl, Lifecycle};
pub use frame::{FrameFormatError, FramePlanes, FrameRef, FrameSink, FrameSource, PixelFormat, Plane, SourceError};
pub use lens::{ConfigError, LensParams, ScreenSpec};
pub use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
