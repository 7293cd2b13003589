//! GravLens bridge: connects a frame source, the lens input layer and a window to the renderer.

mod frame_slot;
mod handle;
mod lens_input;
mod render_loop;
mod window_backend;

pub use frame_slot::{FrameSlot, SlotStats};
pub use handle::RenderHandle;
pub use lens_input::LensInput;
pub use render_loop::{LoopState, LoopStats, RenderError, RenderLoop, TickOutcome};
pub use window_backend::LensWindowBackend;
