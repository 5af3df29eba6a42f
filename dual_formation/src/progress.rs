//! Per-group progress toward the requested tree state.
//!
//! Each population group keeps one scalar in `[0, 1]` that chases its target
//! exponentially: `value += (target − value) · speed · dt`.  The raw value is
//! eased through [`smooth_step`] before anything is interpolated with it.

use serde::{Deserialize, Serialize};

// ════════════════════════════════════════════════════════════════════════════
// TreeState — the authoritative state every group converges toward
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeState {
    /// Scattered through the chaos sphere.
    Chaos,
    /// Assembled on the tree.
    #[default]
    Formed,
}

impl TreeState {
    /// Progress value this state pulls toward.
    pub fn target(self) -> f32 {
        match self {
            TreeState::Chaos  => 0.0,
            TreeState::Formed => 1.0,
        }
    }

    pub fn flipped(self) -> TreeState {
        match self {
            TreeState::Chaos  => TreeState::Formed,
            TreeState::Formed => TreeState::Chaos,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TreeState::Chaos  => "CHAOS",
            TreeState::Formed => "FORMED",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Speeds (per second)
// ════════════════════════════════════════════════════════════════════════════

// Dense foliage settles first, billboards last.
pub const FOLIAGE_SPEED:  f32 = 1.2;
pub const ORNAMENT_SPEED: f32 = 0.8;
pub const POLAROID_SPEED: f32 = 0.7;

// ════════════════════════════════════════════════════════════════════════════
// Easing
// ════════════════════════════════════════════════════════════════════════════

/// Cubic Hermite ease `t²(3 − 2t)`; zero slope at both ends.
pub fn smooth_step(t: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

// ════════════════════════════════════════════════════════════════════════════
// ProgressController
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressController {
    value: f32,
    speed: f32,
}

impl ProgressController {
    /// Start settled on `initial`.
    pub fn new(speed: f32, initial: TreeState) -> Self {
        ProgressController { value: initial.target(), speed }
    }

    /// Advance by `dt` seconds toward `state` and return the eased value.
    ///
    /// Non-finite or negative `dt` leaves the value untouched.  Large `dt`
    /// would overshoot the target; the clamp keeps the value in `[0, 1]`.
    pub fn tick(&mut self, state: TreeState, dt: f32) -> f32 {
        if dt.is_finite() && dt > 0.0 {
            let target = state.target();
            self.value += (target - self.value) * self.speed * dt;
            self.value = self.value.clamp(0.0, 1.0);
        }
        self.eased()
    }

    /// Raw progress in `[0, 1]`.
    pub fn value(&self) -> f32 { self.value }

    pub fn eased(&self) -> f32 { smooth_step(self.value) }

    /// True once the value is within `epsilon` of `state`'s target.
    pub fn is_settled(&self, state: TreeState, epsilon: f32) -> bool {
        (state.target() - self.value).abs() <= epsilon
    }

    /// Snap back to `initial`; used when a population is rebuilt.
    pub fn reset(&mut self, initial: TreeState) {
        self.value = initial.target();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
