//! Populations: the foliage cloud, ornament groups and polaroids, and the
//! [`Formation`] that ticks them all from one authoritative [`TreeState`].

use std::f32::consts::TAU;

use glam::{EulerRot, Quat, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use tree_formation::{chaos_point, tree_point, TreeShape, DEFAULT_CHAOS_RADIUS};

use crate::interpolate::{ClassKind, EntityInstance, Pose};
use crate::progress::{
    ProgressController, TreeState, FOLIAGE_SPEED, ORNAMENT_SPEED, POLAROID_SPEED,
};
use crate::{DualPositionEntry, DualStateSet};

/// Slot count of the reference spiral decorative instances are placed on.
pub const REFERENCE_SLOTS: usize = 15_000;

/// Polaroids never exceed this many, whatever the image count.
const MAX_POLAROIDS: usize = 30;

/// Random jitter added to a polaroid's spiral slot.
const POLAROID_SLOT_JITTER: usize = 500;

/// Push along the radial direction so polaroids hang on the surface.
const POLAROID_RADIAL_NUDGE: f32 = 0.8;

// ════════════════════════════════════════════════════════════════════════════
// Ornament class table
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrnamentClass {
    pub kind:   ClassKind,
    /// 0xRRGGBB.
    pub color:  u32,
    pub weight: f32,
    pub scale:  f32,
}

const fn class(kind: ClassKind, color: u32, weight: f32, scale: f32) -> OrnamentClass {
    OrnamentClass { kind, color, weight, scale }
}

pub const ORNAMENT_CLASSES: [OrnamentClass; 10] = [
    class(ClassKind::Gift,  0xD4AF37, 3.0, 0.30),
    class(ClassKind::Gift,  0xC0C0C0, 3.0, 0.28),
    class(ClassKind::Gift,  0x8B0000, 3.0, 0.32),

    class(ClassKind::Ball,  0xD4AF37, 1.5, 0.25),
    class(ClassKind::Ball,  0xFF1744, 1.5, 0.22),
    class(ClassKind::Ball,  0xFFFFFF, 1.5, 0.24),
    class(ClassKind::Ball,  0x0F4C3A, 1.5, 0.26),

    class(ClassKind::Light, 0xFFF9C4, 0.5, 0.15),
    class(ClassKind::Light, 0xD4AF37, 0.5, 0.12),
    class(ClassKind::Light, 0xFFEB3B, 0.5, 0.13),
];

/// Polaroid frame color.
const POLAROID_COLOR: u32 = 0xFFFFFF;
const POLAROID_SCALE: f32 = 1.0;

// ════════════════════════════════════════════════════════════════════════════
// Builders
// ════════════════════════════════════════════════════════════════════════════

fn symmetric<R: Rng + ?Sized>(rng: &mut R, span: f32) -> f32 {
    (rng.gen::<f32>() - 0.5) * span
}

fn random_rotation<R: Rng + ?Sized>(rng: &mut R) -> Quat {
    Quat::from_euler(
        EulerRot::XYZ,
        rng.gen::<f32>() * TAU,
        rng.gen::<f32>() * TAU,
        rng.gen::<f32>() * TAU,
    )
}

/// Reference-spiral slot for instance `i` of `count`, spread evenly.
fn spread_slot(i: usize, count: usize) -> usize {
    if count == 0 { 0 } else { i * REFERENCE_SLOTS / count }
}

/// Build `count` ornaments, each drawing a random class from [`ORNAMENT_CLASSES`].
///
/// Targets are spread evenly along the reference spiral and jittered so
/// ornaments don't sit exactly on the spiral line.  Formed rotation is
/// yaw-only so ornaments hang upright.
pub fn build_ornaments<R: Rng + ?Sized>(
    count:        usize,
    chaos_radius: f32,
    rng:          &mut R,
) -> Vec<EntityInstance> {
    (0..count)
        .map(|i| {
            let cls = ORNAMENT_CLASSES[rng.gen_range(0..ORNAMENT_CLASSES.len())];
            let chaos = chaos_point(rng, chaos_radius);
            let offset = Vec3::new(symmetric(rng, 0.5), symmetric(rng, 0.3), symmetric(rng, 0.5));
            let target = tree_point(spread_slot(i, count), REFERENCE_SLOTS) + offset;
            let chaos_rotation  = random_rotation(rng);
            let target_rotation = Quat::from_rotation_y(rng.gen::<f32>() * TAU);

            EntityInstance {
                dual: DualPositionEntry::new(chaos, target),
                chaos_rotation,
                target_rotation,
                class_weight: cls.weight,
                kind:         cls.kind,
                color:        cls.color,
                scale:        cls.scale,
                image_index:  None,
            }
        })
        .collect()
}

/// Number of polaroids shown for `image_count` pictures.
pub fn polaroid_count(image_count: usize) -> usize {
    (image_count * 3).min(MAX_POLAROIDS)
}

/// Build the polaroid billboards for `image_count` pictures.
///
/// Besides jitter, each target is nudged out along the radial direction of
/// its spiral point so the pictures hang on the outside of the tree.
pub fn build_polaroids<R: Rng + ?Sized>(
    image_count:  usize,
    chaos_radius: f32,
    rng:          &mut R,
) -> Vec<EntityInstance> {
    let count = polaroid_count(image_count);
    (0..count)
        .map(|i| {
            let slot = spread_slot(i, count) + rng.gen_range(0..POLAROID_SLOT_JITTER);
            let on_tree = tree_point(slot, REFERENCE_SLOTS);
            let offset  = Vec3::new(symmetric(rng, 1.5), symmetric(rng, 0.8), symmetric(rng, 1.5));
            let nudge   = on_tree.normalize_or_zero() * POLAROID_RADIAL_NUDGE;

            let chaos = chaos_point(rng, chaos_radius);
            let chaos_rotation = random_rotation(rng);
            let target_rotation = Quat::from_euler(
                EulerRot::XYZ,
                symmetric(rng, 0.3),
                rng.gen::<f32>() * TAU,
                symmetric(rng, 0.2),
            );

            EntityInstance {
                dual: DualPositionEntry::new(chaos, on_tree + offset + nudge),
                chaos_rotation,
                target_rotation,
                class_weight: 0.0,
                kind:         ClassKind::Polaroid,
                color:        POLAROID_COLOR,
                scale:        POLAROID_SCALE,
                image_index:  Some(i % image_count.max(1)),
            }
        })
        .collect()
}

// ════════════════════════════════════════════════════════════════════════════
// FormationSpec — population sizes, radii and speeds
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormationSpec {
    pub foliage_count:         usize,
    pub ornament_count:        usize,
    pub polaroid_images:       usize,
    pub foliage_chaos_radius:  f32,
    pub ornament_chaos_radius: f32,
    pub polaroid_chaos_radius: f32,
    pub foliage_speed:         f32,
    pub ornament_speed:        f32,
    pub polaroid_speed:        f32,
}

impl Default for FormationSpec {
    fn default() -> Self {
        FormationSpec {
            foliage_count:         15_000,
            ornament_count:        200,
            polaroid_images:       5,
            foliage_chaos_radius:  DEFAULT_CHAOS_RADIUS,
            ornament_chaos_radius: 10.0,
            polaroid_chaos_radius: 12.0,
            foliage_speed:         FOLIAGE_SPEED,
            ornament_speed:        ORNAMENT_SPEED,
            polaroid_speed:        POLAROID_SPEED,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// FoliagePopulation — the point cloud, one shared progress
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct FoliagePopulation {
    set:      DualStateSet,
    progress: ProgressController,
}

impl FoliagePopulation {
    pub fn new<R: Rng + ?Sized>(
        count:        usize,
        chaos_radius: f32,
        speed:        f32,
        initial:      TreeState,
        rng:          &mut R,
    ) -> Self {
        FoliagePopulation {
            set:      DualStateSet::build_with(count, chaos_radius, &TreeShape::default(), rng),
            progress: ProgressController::new(speed, initial),
        }
    }

    pub fn tick(&mut self, state: TreeState, dt: f32) -> f32 {
        self.progress.tick(state, dt)
    }

    /// Shared blend factor for the renderer.
    pub fn blend(&self) -> f32 { self.progress.eased() }

    pub fn set(&self)      -> &DualStateSet       { &self.set }
    pub fn progress(&self) -> &ProgressController { &self.progress }
}

// ════════════════════════════════════════════════════════════════════════════
// InstanceGroup — ornaments of one kind, or the polaroids
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct InstanceGroup {
    kind:      ClassKind,
    instances: Vec<EntityInstance>,
    progress:  ProgressController,
}

impl InstanceGroup {
    pub fn new(
        kind:      ClassKind,
        instances: Vec<EntityInstance>,
        speed:     f32,
        initial:   TreeState,
    ) -> Self {
        InstanceGroup { kind, instances, progress: ProgressController::new(speed, initial) }
    }

    /// Split ornaments into one group per kind (gift, ball, light), keeping order.
    pub fn by_kind(ornaments: Vec<EntityInstance>, speed: f32, initial: TreeState) -> Vec<Self> {
        [ClassKind::Gift, ClassKind::Ball, ClassKind::Light]
            .into_iter()
            .map(|kind| {
                let members = ornaments.iter().filter(|o| o.kind == kind).cloned().collect();
                InstanceGroup::new(kind, members, speed, initial)
            })
            .collect()
    }

    pub fn tick(&mut self, state: TreeState, dt: f32) -> f32 {
        self.progress.tick(state, dt)
    }

    /// Current pose of every instance, in order.
    pub fn poses(&self) -> impl Iterator<Item = (&EntityInstance, Pose)> + '_ {
        let eased = self.progress.eased();
        self.instances.iter().map(move |inst| (inst, inst.pose(eased)))
    }

    pub fn kind(&self)      -> ClassKind            { self.kind }
    pub fn instances(&self) -> &[EntityInstance]    { &self.instances }
    pub fn len(&self)       -> usize                { self.instances.len() }
    pub fn is_empty(&self)  -> bool                 { self.instances.is_empty() }
    pub fn progress(&self)  -> &ProgressController  { &self.progress }
}

// ════════════════════════════════════════════════════════════════════════════
// Formation — every population of one scene
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug)]
pub struct Formation {
    foliage:   FoliagePopulation,
    ornaments: Vec<InstanceGroup>,
    polaroids: InstanceGroup,
}

impl Formation {
    /// Build every population, settled on `initial`.
    pub fn build<R: Rng + ?Sized>(spec: FormationSpec, initial: TreeState, rng: &mut R) -> Self {
        let foliage = FoliagePopulation::new(
            spec.foliage_count,
            spec.foliage_chaos_radius,
            spec.foliage_speed,
            initial,
            rng,
        );
        let ornaments = InstanceGroup::by_kind(
            build_ornaments(spec.ornament_count, spec.ornament_chaos_radius, rng),
            spec.ornament_speed,
            initial,
        );
        let polaroids = InstanceGroup::new(
            ClassKind::Polaroid,
            build_polaroids(spec.polaroid_images, spec.polaroid_chaos_radius, rng),
            spec.polaroid_speed,
            initial,
        );

        info!(
            foliage   = foliage.set().len(),
            ornaments = ornaments.iter().map(InstanceGroup::len).sum::<usize>(),
            polaroids = polaroids.len(),
            "formation built"
        );
        for g in &ornaments {
            debug!(kind = g.kind().name(), count = g.len(), "ornament group");
        }

        Formation { foliage, ornaments, polaroids }
    }

    /// Advance every population toward `state` by `dt` seconds.
    pub fn tick(&mut self, state: TreeState, dt: f32) {
        self.foliage.tick(state, dt);
        for g in &mut self.ornaments {
            g.tick(state, dt);
        }
        self.polaroids.tick(state, dt);
    }

    pub fn foliage(&self)   -> &FoliagePopulation { &self.foliage }
    pub fn ornaments(&self) -> &[InstanceGroup]   { &self.ornaments }
    pub fn polaroids(&self) -> &InstanceGroup     { &self.polaroids }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use tree_formation::formation_rng;

    fn small_spec() -> FormationSpec {
        FormationSpec { foliage_count: 300, ..FormationSpec::default() }
    }

    #[test]
    fn ornament_classes_well_formed() {
        for c in ORNAMENT_CLASSES.iter() {
            assert!(c.kind.is_weighted());
            assert!(c.scale > 0.0);
        }
        let gift  = ORNAMENT_CLASSES.iter().find(|c| c.kind == ClassKind::Gift).unwrap();
        let light = ORNAMENT_CLASSES.iter().find(|c| c.kind == ClassKind::Light).unwrap();
        assert!(gift.weight > light.weight);
    }

    #[test]
    fn ornaments_near_spiral() {
        let mut rng = formation_rng(Some(11));
        let orns = build_ornaments(200, 10.0, &mut rng);
        assert_eq!(orns.len(), 200);
        for (i, o) in orns.iter().enumerate() {
            let slot = tree_point(spread_slot(i, 200), REFERENCE_SLOTS);
            let d = o.dual.target_position - slot;
            assert!(d.x.abs() <= 0.25 + 1e-4 && d.y.abs() <= 0.15 + 1e-4 && d.z.abs() <= 0.25 + 1e-4);
            assert!(o.dual.chaos_position.length() <= 10.0 * (1.0 + 1e-5));
            assert!(o.image_index.is_none());
        }
    }

    #[test]
    fn polaroid_count_capped() {
        assert_eq!(polaroid_count(5), 15);
        assert_eq!(polaroid_count(10), 30);
        assert_eq!(polaroid_count(100), 30);
        assert_eq!(polaroid_count(0), 0);
    }

    #[test]
    fn polaroids_cycle_images() {
        let mut rng = formation_rng(Some(12));
        let pols = build_polaroids(5, 12.0, &mut rng);
        assert_eq!(pols.len(), 15);
        for (i, p) in pols.iter().enumerate() {
            assert_eq!(p.kind, ClassKind::Polaroid);
            assert_eq!(p.image_index, Some(i % 5));
            assert!(p.dual.target_position.is_finite());
        }
    }

    #[test]
    fn polaroid_slots_stay_on_reference_spiral() {
        // Highest slot: spread of the last polaroid plus maximum jitter.
        let count = polaroid_count(10);
        assert!(spread_slot(count - 1, count) + POLAROID_SLOT_JITTER - 1 < REFERENCE_SLOTS);
    }

    #[test]
    fn ornaments_grouped_by_kind() {
        let mut rng = formation_rng(Some(13));
        let orns = build_ornaments(120, 10.0, &mut rng);
        let groups = InstanceGroup::by_kind(orns, ORNAMENT_SPEED, TreeState::Formed);
        assert_eq!(groups.len(), 3);
        assert_eq!(groups.iter().map(InstanceGroup::len).sum::<usize>(), 120);
        for g in &groups {
            assert!(g.instances().iter().all(|o| o.kind == g.kind()));
        }
    }

    #[test]
    fn formation_starts_settled() {
        let mut rng = formation_rng(Some(14));
        let f = Formation::build(small_spec(), TreeState::Formed, &mut rng);
        assert_eq!(f.foliage().blend(), 1.0);
        for g in f.ornaments() {
            for (inst, pose) in g.poses() {
                let d = pose.position.distance(inst.dual.target_position);
                assert!(d < 1e-4);
            }
        }
    }

    #[test]
    fn formation_explodes_in_layers() {
        let mut rng = formation_rng(Some(15));
        let mut f = Formation::build(small_spec(), TreeState::Formed, &mut rng);
        for _ in 0..45 {
            f.tick(TreeState::Chaos, 1.0 / 60.0);
        }
        let foliage  = f.foliage().progress().value();
        let ornament = f.ornaments()[0].progress().value();
        let polaroid = f.polaroids().progress().value();
        assert!(foliage < ornament && ornament < polaroid);
        assert!(polaroid < 1.0);
    }

    #[test]
    fn spec_defaults_from_empty_json() {
        let spec: FormationSpec = serde_json::from_str("{}").unwrap();
        assert_eq!(spec, FormationSpec::default());
        let spec: FormationSpec = serde_json::from_str(r#"{"ornament_count": 12}"#).unwrap();
        assert_eq!(spec.ornament_count, 12);
        assert_eq!(spec.foliage_count, 15_000);
    }
}
