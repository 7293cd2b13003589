//! Lens placement shared between the input layer and the render loop.

use lens_api::{ConfigError, LensControl, LensParams};
use parking_lot::Mutex;

/// Current lens parameters plus a revision that bumps on every accepted update.
/// The render loop compares revisions to decide whether the mesh is stale.
#[derive(Default)]
pub struct LensInput {
    state: Mutex<(LensParams, u64)>,
}

impl LensInput {
    pub fn new(params: LensParams) -> Self {
        Self { state: Mutex::new((params, 0)) }
    }

    /// Params and revision read together.
    pub fn snapshot(&self) -> (LensParams, u64) {
        *self.state.lock()
    }

    pub fn params(&self) -> LensParams {
        self.state.lock().0
    }

    pub fn set_params(&self, params: LensParams) {
        let mut state = self.state.lock();
        state.0 = params;
        state.1 += 1;
    }

    /// Remove the lensing object from the screen.
    pub fn clear(&self) {
        self.set_params(LensParams::inactive());
    }
}

impl LensControl for LensInput {
    fn set_lens_params(&self, center_x: f32, center_y: f32, radius: f32, strength: f32) -> Result<(), ConfigError> {
        let params = LensParams::new(center_x, center_y, radius, strength)?;
        self.set_params(params);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepted_updates_bump_the_revision() {
        let input = LensInput::default();
        assert_eq!(input.snapshot(), (LensParams::inactive(), 0));
        input.set_lens_params(10.0, 20.0, 50.0, 0.5).unwrap();
        let (params, revision) = input.snapshot();
        assert_eq!(params.center(), [10.0, 20.0]);
        assert_eq!(revision, 1);
    }

    #[test]
    fn rejected_updates_leave_state_alone() {
        let input = LensInput::default();
        assert_eq!(input.set_lens_params(0.0, 0.0, -1.0, 0.5), Err(ConfigError::NegativeRadius(-1.0)));
        assert!(input.set_lens_params(f32::NAN, 0.0, 1.0, 0.5).is_err());
        assert_eq!(input.snapshot().1, 0);
    }
}
