//! Fixed reward policy for command outcomes.

/// Reward attached to a successful step.
pub const SUCCESS: f64 = 1.0;
/// Reward attached to a failed step.
pub const FAILURE: f64 = -0.1;
/// Reward attached to the reset observation.
pub const RESET: f64 = 0.0;

pub fn for_outcome(success: bool) -> f64 {
    if success { SUCCESS } else { FAILURE }
}
