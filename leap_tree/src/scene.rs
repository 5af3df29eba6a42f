//! The scene: one router, one classifier, one formation, one camera.
//!
//! [`Scene::tick`] is the whole per-frame pipeline:
//!
//! 1. apply queued detector events to the gesture state
//! 2. fall back to manual control if gesture detection failed
//! 3. resolve the tree state
//! 4. advance every progress controller
//! 5. move the camera
//!
//! Rendering reads the scene afterwards and never writes to it.

use dual_formation::{Formation, TreeState};
use glam::Vec3;
use tracing::{info, warn};
use tree_formation::formation_rng;

use crate::config::SceneConfig;
use crate::detector::DetectorFactory;
use crate::gesture::{GestureClassifier, GestureState, StatusLabel};
use crate::router::ControlSignalRouter;

// ════════════════════════════════════════════════════════════════════════════
// CameraRig
// ════════════════════════════════════════════════════════════════════════════

/// Camera that drifts toward a goal set by the hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraRig {
    position: Vec3,
}

impl CameraRig {
    pub const HOME:    Vec3 = Vec3::new(0.0, 4.0, 20.0);
    pub const LOOK_AT: Vec3 = Vec3::new(0.0, 4.0, 0.0);
    /// Fraction of the remaining distance covered per frame.
    pub const FOLLOW:  f32  = 0.1;

    pub fn new() -> Self { CameraRig { position: Self::HOME } }

    pub fn position(&self) -> Vec3 { self.position }

    /// Where the camera heads for a hand at `center` (`None` = no gesture control).
    pub fn goal(center: Option<Vec3>) -> Vec3 {
        match center {
            Some(h) => Vec3::new(h.x * 10.0, 4.0 + h.y * 5.0, 20.0 + h.z),
            None    => Self::HOME,
        }
    }

    pub fn update(&mut self, center: Option<Vec3>) {
        let goal = Self::goal(center);
        if goal.is_finite() {
            self.position = self.position.lerp(goal, Self::FOLLOW);
        }
    }
}

impl Default for CameraRig {
    fn default() -> Self { Self::new() }
}

// ════════════════════════════════════════════════════════════════════════════
// Scene
// ════════════════════════════════════════════════════════════════════════════

/// Makes a fresh detector each time gesture control is switched on.
pub type DetectorSource = Box<dyn FnMut() -> DetectorFactory>;

pub struct Scene {
    router:     ControlSignalRouter,
    classifier: GestureClassifier,
    formation:  Formation,
    camera:     CameraRig,
    elapsed:    f32,
    detectors:  DetectorSource,
}

impl Scene {
    pub fn new(cfg: &SceneConfig, detectors: DetectorSource) -> Self {
        let mut rng = formation_rng(cfg.seed);
        let formation = Formation::build(cfg.formation.clone(), cfg.initial_state, &mut rng);
        info!(state = cfg.initial_state.label(), seed = ?cfg.seed, "scene ready");
        Scene {
            router:     ControlSignalRouter::new(cfg.initial_state),
            classifier: GestureClassifier::new(cfg.gesture.clone()),
            formation,
            camera:     CameraRig::new(),
            elapsed:    0.0,
            detectors,
        }
    }

    // ── UI commands ───────────────────────────────────────────────────────

    pub fn toggle_manual(&mut self) -> bool { self.router.toggle_manual() }

    /// Switch gesture control.  On starts a new detector; off releases it.
    pub fn set_gesture_enabled(&mut self, enabled: bool) {
        if enabled == self.router.gesture_enabled() {
            return;
        }
        self.router.set_gesture_enabled(enabled);
        if enabled {
            let factory = (self.detectors)();
            self.classifier.start(factory);
        } else {
            self.classifier.stop();
        }
    }

    pub fn toggle_gesture(&mut self) {
        let on = !self.router.gesture_enabled();
        self.set_gesture_enabled(on);
    }

    // ── per frame ─────────────────────────────────────────────────────────

    pub fn tick(&mut self, dt: f32) -> TreeState {
        self.classifier.pump();

        // Detection died: hand the tree back to the manual toggle, keep the message.
        if self.router.gesture_enabled() && self.classifier.state().status == StatusLabel::Error {
            warn!("gesture detection failed; manual control restored");
            self.router.set_gesture_enabled(false);
        }

        let state = self.router.resolve(self.classifier.state());
        self.formation.tick(state, dt);

        let center = self.router.gesture_enabled().then(|| self.classifier.state().hand_center);
        self.camera.update(center);

        if dt.is_finite() && dt > 0.0 {
            self.elapsed += dt;
        }
        state
    }

    // ── reads ─────────────────────────────────────────────────────────────

    pub fn tree_state(&self)      -> TreeState            { self.router.state() }
    pub fn gesture_enabled(&self) -> bool                 { self.router.gesture_enabled() }
    pub fn gesture(&self)         -> &GestureState        { self.classifier.state() }
    pub fn formation(&self)       -> &Formation           { &self.formation }
    pub fn camera(&self)          -> &CameraRig           { &self.camera }
    /// Seconds of scene time, for animation.
    pub fn elapsed(&self)         -> f32                  { self.elapsed }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::{hand_frame, Script, ScriptedDetector};
    use crate::detector::{SimHandControl, SimHandDetector};
    use dual_formation::FormationSpec;
    use std::time::{Duration, Instant};

    const DT: f32 = 1.0 / 60.0;

    fn small_config() -> SceneConfig {
        SceneConfig {
            formation: FormationSpec {
                foliage_count:   64,
                ornament_count:  30,
                polaroid_images: 1,
                ..FormationSpec::default()
            },
            seed: Some(11),
            ..SceneConfig::default()
        }
    }

    fn scripted(make: fn() -> Script) -> DetectorSource {
        Box::new(move || ScriptedDetector::factory(make()))
    }

    fn tick_until(scene: &mut Scene, pred: impl Fn(&Scene) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            scene.tick(DT);
            if pred(scene) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn open_hand() -> Script {
        Script::frames(vec![Some(hand_frame(Vec3::new(0.5, 0.5, 0.0), 0.4))])
    }

    fn denied() -> Script { Script::failing_camera("denied") }

    #[test]
    fn manual_toggle_drives_foliage() {
        let mut scene = Scene::new(&small_config(), scripted(open_hand));
        assert_eq!(scene.formation().foliage().blend(), 1.0);

        assert!(scene.toggle_manual());
        for _ in 0..600 {
            scene.tick(DT);
        }
        assert_eq!(scene.tree_state(), TreeState::Chaos);
        assert!(scene.formation().foliage().blend() < 0.01);
        assert!(scene.elapsed() > 9.0);
    }

    #[test]
    fn open_hand_scatters_then_disable_reforms() {
        let mut scene = Scene::new(&small_config(), scripted(open_hand));
        scene.set_gesture_enabled(true);
        assert!(!scene.toggle_manual());

        assert!(tick_until(&mut scene, |s| s.tree_state() == TreeState::Chaos));
        assert!(scene.gesture().is_open);

        scene.set_gesture_enabled(false);
        assert_eq!(scene.tree_state(), TreeState::Formed);
        assert_eq!(scene.gesture().status, StatusLabel::Inactive);
    }

    #[test]
    fn failure_falls_back_to_manual() {
        let mut scene = Scene::new(&small_config(), scripted(denied));
        scene.set_gesture_enabled(true);

        assert!(tick_until(&mut scene, |s| !s.gesture_enabled()));
        assert_eq!(scene.gesture().status, StatusLabel::Error);
        assert!(scene.gesture().error.as_deref().unwrap().contains("denied"));

        assert!(scene.toggle_manual());
        scene.tick(DT);
        assert_eq!(scene.tree_state(), TreeState::Chaos);
        // Message stays up until gesture control is retried.
        assert!(scene.gesture().error.is_some());
    }

    #[test]
    fn re_enabling_restarts_acquisition() {
        let mut scene = Scene::new(&small_config(), scripted(denied));
        scene.set_gesture_enabled(true);
        assert!(tick_until(&mut scene, |s| !s.gesture_enabled()));

        scene.set_gesture_enabled(true);
        assert!(scene.gesture().error.is_none());
        assert_eq!(scene.gesture().status, StatusLabel::RequestingCamera);
    }

    #[test]
    fn sim_hand_moves_camera() {
        let control = SimHandControl::default();
        control.update(|h| h.wrist = Vec3::new(0.75, 0.5, 0.0));
        let ctl = control.clone();
        let mut scene = Scene::new(
            &small_config(),
            Box::new(move || SimHandDetector::factory(ctl.clone(), None)),
        );
        scene.toggle_gesture();
        assert!(tick_until(&mut scene, |s| s.gesture().status == StatusLabel::HandDetected));
        for _ in 0..120 {
            scene.tick(DT);
        }
        // hand x 0.5 → goal x 5
        assert!((scene.camera().position().x - 5.0).abs() < 0.1);
        scene.toggle_gesture();
        assert!(!scene.gesture_enabled());
    }

    #[test]
    fn camera_goal_mapping() {
        assert_eq!(CameraRig::goal(None), CameraRig::HOME);
        assert_eq!(
            CameraRig::goal(Some(Vec3::new(1.0, -1.0, 2.0))),
            Vec3::new(10.0, -1.0, 22.0)
        );
    }

    #[test]
    fn camera_converges_home() {
        let mut rig = CameraRig::new();
        rig.update(Some(Vec3::new(1.0, 0.0, 0.0)));
        assert!((rig.position().x - 1.0).abs() < 1e-5);
        for _ in 0..200 {
            rig.update(None);
        }
        assert!(rig.position().distance(CameraRig::HOME) < 1e-3);
    }

    #[test]
    fn seeded_scenes_match() {
        let a = Scene::new(&small_config(), scripted(open_hand));
        let b = Scene::new(&small_config(), scripted(open_hand));
        assert_eq!(
            a.formation().foliage().set().entries(),
            b.formation().foliage().set().entries()
        );
    }
}
