//! Turning eased progress into positions and rotations.
//!
//! Foliage needs nothing from here: the renderer blends its two endpoint
//! arrays by the group's eased scalar.  Discrete instances (ornaments and
//! polaroids) are posed one by one.  Ornaments bias the shared progress by
//! their class weight so heavy gifts land before light bulbs; polaroids use
//! their group's progress as is.

use glam::{Quat, Vec3};
use serde::Serialize;

use crate::DualPositionEntry;

/// Fraction of the class weight added to the progress multiplier.
pub const WEIGHT_GAIN: f32 = 0.1;

// ════════════════════════════════════════════════════════════════════════════
// ClassKind
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ClassKind {
    Gift,
    Ball,
    Light,
    Polaroid,
}

impl ClassKind {
    /// Whether instances of this kind scale progress by their class weight.
    pub fn is_weighted(self) -> bool {
        !matches!(self, ClassKind::Polaroid)
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassKind::Gift     => "gift",
            ClassKind::Ball     => "ball",
            ClassKind::Light    => "light",
            ClassKind::Polaroid => "polaroid",
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Weighting
// ════════════════════════════════════════════════════════════════════════════

/// `clamp(eased · (1 + weight · 0.1), 0, 1)`.
pub fn weighted_progress(eased: f32, class_weight: f32) -> f32 {
    (eased * (1.0 + class_weight * WEIGHT_GAIN)).clamp(0.0, 1.0)
}

/// Spherical interpolation along the shorter of the two arcs.
fn slerp_shortest(from: Quat, to: Quat, t: f32) -> Quat {
    let to = if from.dot(to) < 0.0 { -to } else { to };
    from.slerp(to, t).normalize()
}

// ════════════════════════════════════════════════════════════════════════════
// Pose
// ════════════════════════════════════════════════════════════════════════════

/// What the renderer needs to place one instance this frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale:    f32,
}

// ════════════════════════════════════════════════════════════════════════════
// EntityInstance
// ════════════════════════════════════════════════════════════════════════════

/// A discrete decorative instance: ornament or polaroid.
///
/// Built once with its population and never mutated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct EntityInstance {
    pub dual:            DualPositionEntry,
    pub chaos_rotation:  Quat,
    pub target_rotation: Quat,
    pub class_weight:    f32,
    pub kind:            ClassKind,
    /// 0xRRGGBB.
    pub color:           u32,
    pub scale:           f32,
    /// Picture shown on a polaroid; `None` for ornaments.
    pub image_index:     Option<usize>,
}

impl EntityInstance {
    /// Progress this instance interpolates by, given its group's eased value.
    pub fn progress_for(&self, eased: f32) -> f32 {
        if self.kind.is_weighted() {
            weighted_progress(eased, self.class_weight)
        } else {
            eased.clamp(0.0, 1.0)
        }
    }

    /// Position, rotation and scale at the group's eased progress.
    pub fn pose(&self, eased: f32) -> Pose {
        let t = self.progress_for(eased);
        Pose {
            position: self.dual.at(t),
            rotation: slerp_shortest(self.chaos_rotation, self.target_rotation, t),
            scale:    self.scale,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
