//! # tree_formation
//!
//! Point generators for the two configurations a formation morphs between:
//!
//! * **Chaos**: a volumetrically uniform scatter inside a sphere
//!   ([`chaos_point`]).
//! * **Formed**: a cone-shaped phyllotaxis spiral, the "tree"
//!   ([`tree_point`], [`TreeShape`]).
//!
//! Both are plain functions over [`glam::Vec3`].  The chaos generator takes
//! its randomness from the caller so populations can be rebuilt
//! reproducibly from a seed ([`formation_rng`]).
//!
//! ```rust
//! use tree_formation::{chaos_point, tree_point, formation_rng};
//!
//! let mut rng = formation_rng(Some(7));
//! let loose  = chaos_point(&mut rng, 8.0);
//! let placed = tree_point(42, 1000);
//! assert!(loose.length() <= 8.0 + 1e-4);
//! assert_eq!(placed, tree_point(42, 1000));
//! ```

use std::f32::consts::{PI, TAU};

use glam::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ════════════════════════════════════════════════════════════════════════════
// Constants
// ════════════════════════════════════════════════════════════════════════════

/// The golden angle π(3 − √5), in radians.
///
/// Used as the constant angular step between successive spiral points, it
/// never lines points up radially, which gives even phyllotaxis packing.
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Sphere radius used for the foliage point cloud's chaos positions.
pub const DEFAULT_CHAOS_RADIUS: f32 = 8.0;

// ════════════════════════════════════════════════════════════════════════════
// Random source
// ════════════════════════════════════════════════════════════════════════════

/// Build the random source for a population.
///
/// `Some(seed)` gives a reproducible stream; `None` seeds from OS entropy.
pub fn formation_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None    => StdRng::from_entropy(),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Chaos distribution
// ════════════════════════════════════════════════════════════════════════════

/// Sample a point uniformly inside a sphere of `radius` centred on the origin.
///
/// The radius is drawn as `radius · ∛U` and the polar angle as
/// `acos(2U − 1)`; without those two corrections samples bunch up at the
/// centre and at the poles.
pub fn chaos_point<R: Rng + ?Sized>(rng: &mut R, radius: f32) -> Vec3 {
    let theta = rng.gen::<f32>() * TAU;
    let phi   = (2.0 * rng.gen::<f32>() - 1.0).clamp(-1.0, 1.0).acos();
    let r     = rng.gen::<f32>().cbrt() * radius;

    Vec3::new(
        r * phi.sin() * theta.cos(),
        r * phi.sin() * theta.sin(),
        r * phi.cos(),
    )
}

// ════════════════════════════════════════════════════════════════════════════
// Tree distribution
// ════════════════════════════════════════════════════════════════════════════

/// Geometry of the formed cone.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TreeShape {
    /// Vertical extent from the lowest to the highest spiral point.
    pub height:        f32,
    /// Amount the whole cone is shifted down (the base sits at `-offset`).
    pub offset:        f32,
    /// Radius at the base, before the ripple.
    pub max_radius:    f32,
    /// Fraction of `max_radius` lost between base and tip.
    pub taper:         f32,
    /// Amplitude of the sinusoidal radius ripple.
    pub ripple_amp:    f32,
    /// Ripple frequency in half-turns over the full height.
    pub ripple_freq:   f32,
}

impl Default for TreeShape {
    fn default() -> Self {
        TreeShape {
            height:      10.0,
            offset:      2.0,
            max_radius:  3.5,
            taper:       0.8,
            ripple_amp:  0.3,
            ripple_freq: 8.0,
        }
    }
}

impl TreeShape {
    /// Position of spiral slot `index` out of `total`.
    ///
    /// Slot 0 sits at the base; height grows linearly with `index / total`.
    /// `total == 0` is treated as a single slot at the base.
    pub fn point(&self, index: usize, total: usize) -> Vec3 {
        let height_ratio = if total == 0 { 0.0 } else { index as f32 / total as f32 };
        let y = height_ratio * self.height - self.offset;

        let ripple = (height_ratio * PI * self.ripple_freq).sin() * self.ripple_amp;
        let radius = self.max_radius * (1.0 - height_ratio * self.taper) + ripple;

        let theta = index as f32 * GOLDEN_ANGLE;
        Vec3::new(theta.cos() * radius, y, theta.sin() * radius)
    }

    /// Lowest y any slot can take.
    pub fn base_y(&self) -> f32 { -self.offset }

    /// Upper bound on slot y (reached only in the limit `index → total`).
    pub fn tip_y(&self) -> f32 { self.height - self.offset }
}

/// [`TreeShape::point`] on the default cone.
pub fn tree_point(index: usize, total: usize) -> Vec3 {
    TreeShape::default().point(index, total)
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
