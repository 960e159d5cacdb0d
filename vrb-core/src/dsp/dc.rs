//! One-pole DC blocker.
//!
//! ## Recurrence
//!
//! For every sample `x`:
//!
//! ```text
//! state = alpha * state + x
//! y     = x - state
//! ```
//!
//! `state` belongs to the stream, not the call, so it must survive between
//! blocks. [`DcBlocker`] keeps it together with `alpha`.

use serde::{Deserialize, Serialize};

/// Default pole position.
pub const DEFAULT_DC_ALPHA: f32 = 0.995;

/// Runs the recurrence over `buffer` in place, updating `state`.
pub fn remove_dc(buffer: &mut [f32], state: &mut f32, alpha: f32) {
    for s in buffer.iter_mut() {
        *state = alpha * *state + *s;
        *s -= *state;
    }
}

/// Per-stream DC blocker state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DcBlocker {
    state: f32,
    alpha: f32,
}

impl DcBlocker {
    pub fn new(alpha: f32) -> Self {
        Self { state: 0.0, alpha }
    }

    pub fn process(&mut self, buffer: &mut [f32]) {
        remove_dc(buffer, &mut self.state, self.alpha);
    }

    /// Current running state.
    pub fn state(&self) -> f32 {
        self.state
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn reset(&mut self) {
        self.state = 0.0;
    }
}

impl Default for DcBlocker {
    fn default() -> Self {
        Self::new(DEFAULT_DC_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn first_sample_follows_recurrence() {
        let mut state = 0.0;
        let mut buf = [1.0f32, 1.0];
        remove_dc(&mut buf, &mut state, 0.5);
        // state: 1.0, then 0.5 + 1.0
        assert_relative_eq!(buf[0], 0.0);
        assert_relative_eq!(buf[1], -0.5);
        assert_relative_eq!(state, 1.5);
    }

    #[test]
    fn state_carries_across_calls() {
        let input: Vec<f32> = (0..64).map(|i| (i as f32 * 0.1).sin() + 0.3).collect();

        let mut whole = input.clone();
        let mut state_whole = 0.0;
        remove_dc(&mut whole, &mut state_whole, DEFAULT_DC_ALPHA);

        let mut blocker = DcBlocker::default();
        let mut split = input.clone();
        let (a, b) = split.split_at_mut(25);
        blocker.process(a);
        blocker.process(b);

        assert_eq!(whole, split);
        assert_eq!(state_whole, blocker.state());
    }

    #[test]
    fn reset_clears_state() {
        let mut blocker = DcBlocker::new(0.9);
        blocker.process(&mut [0.5; 8]);
        assert!(blocker.state() != 0.0);
        blocker.reset();
        assert_eq!(blocker.state(), 0.0);
        assert_eq!(blocker.alpha(), 0.9);
    }
}
