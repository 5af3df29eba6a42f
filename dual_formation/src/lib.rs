//! # dual_formation
//!
//! Every entity in a formation owns two positions: where it floats in the
//! chaos sphere and where it sits on the tree.  This crate pairs them up
//! ([`DualStateSet`]), moves a per-group progress scalar toward whichever
//! state is requested ([`ProgressController`]) and turns that scalar into
//! positions and rotations ([`EntityInstance::pose`]).
//!
//! ```rust
//! use dual_formation::{DualStateSet, ProgressController, TreeState, FOLIAGE_SPEED};
//! use tree_formation::formation_rng;
//!
//! let mut rng = formation_rng(Some(1));
//! let set = DualStateSet::build(1_000, &mut rng);
//!
//! let mut progress = ProgressController::new(FOLIAGE_SPEED, TreeState::Chaos);
//! let eased = progress.tick(TreeState::Formed, 1.0 / 60.0);
//!
//! let mut points = Vec::new();
//! set.blend_into(eased, &mut points);
//! assert_eq!(points.len(), 1_000);
//! ```

pub mod progress;
pub mod interpolate;
pub mod population;

pub use progress::{
    smooth_step, ProgressController, TreeState, FOLIAGE_SPEED, ORNAMENT_SPEED, POLAROID_SPEED,
};
pub use interpolate::{weighted_progress, ClassKind, EntityInstance, Pose, WEIGHT_GAIN};
pub use population::{
    build_ornaments, build_polaroids, polaroid_count, FoliagePopulation, Formation,
    FormationSpec, InstanceGroup, OrnamentClass, ORNAMENT_CLASSES, REFERENCE_SLOTS,
};

use glam::Vec3;
use rand::Rng;
use serde::Serialize;
use tracing::debug;
use tree_formation::{chaos_point, TreeShape, DEFAULT_CHAOS_RADIUS};

// ════════════════════════════════════════════════════════════════════════════
// DualPositionEntry
// ════════════════════════════════════════════════════════════════════════════

/// The chaos and formed positions of one entity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DualPositionEntry {
    pub chaos_position:  Vec3,
    pub target_position: Vec3,
}

impl DualPositionEntry {
    pub fn new(chaos_position: Vec3, target_position: Vec3) -> Self {
        DualPositionEntry { chaos_position, target_position }
    }

    /// Linear blend: `t = 0` is chaos, `t = 1` is formed.
    pub fn at(&self, t: f32) -> Vec3 {
        self.chaos_position.lerp(self.target_position, t)
    }
}

// ════════════════════════════════════════════════════════════════════════════
// DualStateSet
// ════════════════════════════════════════════════════════════════════════════

/// Immutable chaos/formed pairs for a whole population.
///
/// Entry `i` targets tree slot `i` of `len()`.  The set is never resized;
/// a population with a different count builds a new set.
#[derive(Clone, Debug, Serialize)]
pub struct DualStateSet {
    entries: Vec<DualPositionEntry>,
}

impl DualStateSet {
    /// Build `count` entries on the default cone with chaos radius
    /// [`DEFAULT_CHAOS_RADIUS`].
    pub fn build<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        Self::build_with(count, DEFAULT_CHAOS_RADIUS, &TreeShape::default(), rng)
    }

    pub fn build_with<R: Rng + ?Sized>(
        count:        usize,
        chaos_radius: f32,
        shape:        &TreeShape,
        rng:          &mut R,
    ) -> Self {
        let entries = (0..count)
            .map(|i| DualPositionEntry::new(chaos_point(rng, chaos_radius), shape.point(i, count)))
            .collect();
        debug!(count, chaos_radius, "built dual state set");
        DualStateSet { entries }
    }

    pub fn len(&self)      -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool  { self.entries.is_empty() }

    pub fn entries(&self) -> &[DualPositionEntry] { &self.entries }

    pub fn get(&self, index: usize) -> Option<&DualPositionEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DualPositionEntry> {
        self.entries.iter()
    }

    /// Renderer-side blend of every entry by the shared factor `t`.
    ///
    /// `out` is cleared and refilled so callers can reuse one buffer per frame.
    pub fn blend_into(&self, t: f32, out: &mut Vec<Vec3>) {
        out.clear();
        out.extend(self.entries.iter().map(|e| e.at(t)));
    }
}

impl<'a> IntoIterator for &'a DualStateSet {
    type Item     = &'a DualPositionEntry;
    type IntoIter = std::slice::Iter<'a, DualPositionEntry>;
    fn into_iter(self) -> Self::IntoIter { self.entries.iter() }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
