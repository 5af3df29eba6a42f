//! Top-level application loop.
//!
//! `run` owns the window and the [`Scene`]; each frame it reads keys,
//! applies them as [`UiCommand`]s, ticks the scene with the measured frame
//! time and renders.

use std::time::Instant;

use tracing::{info, trace};

use crate::config::SceneConfig;
use crate::detector::{SimFailure, SimHandControl, SimHandDetector};
use crate::error::AppError;
use crate::scene::{DetectorSource, Scene};
use crate::visualizer::{UiCommand, Visualizer};

// ════════════════════════════════════════════════════════════════════════════
// AppConfig
// ════════════════════════════════════════════════════════════════════════════

/// Which hand detector gesture control starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectorKind {
    /// Keyboard-driven hand, optionally failing at one acquisition phase.
    Simulated { fail_at: Option<SimFailure> },
    #[cfg(feature = "leap")]
    Leap,
}

impl Default for DetectorKind {
    #[cfg(feature = "leap")]
    fn default() -> Self { DetectorKind::Leap }

    #[cfg(not(feature = "leap"))]
    fn default() -> Self { DetectorKind::Simulated { fail_at: None } }
}

#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub scene:         SceneConfig,
    pub detector:      DetectorKind,
    /// Turn gesture control on as soon as the window opens.
    pub start_gesture: bool,
}

/// A fresh-detector source for `kind`.  The simulated hand reads `sim`.
pub fn detector_source(kind: DetectorKind, sim: SimHandControl) -> DetectorSource {
    match kind {
        DetectorKind::Simulated { fail_at } => {
            Box::new(move || SimHandDetector::factory(sim.clone(), fail_at))
        }
        #[cfg(feature = "leap")]
        DetectorKind::Leap => Box::new(crate::detector::LeapHandDetector::factory),
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Frame timing
// ════════════════════════════════════════════════════════════════════════════

/// Longest step fed to the scene; a stalled frame shouldn't teleport the tree.
pub const MAX_FRAME_DT: f32 = 0.1;

pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new() -> Self { FrameClock { last: Instant::now() } }

    /// Seconds since the previous call, at most [`MAX_FRAME_DT`].
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last).as_secs_f32();
        self.last = now;
        dt.min(MAX_FRAME_DT)
    }
}

impl Default for FrameClock {
    fn default() -> Self { Self::new() }
}

// ════════════════════════════════════════════════════════════════════════════
// Commands
// ════════════════════════════════════════════════════════════════════════════

/// Apply one command.  Returns false when the app should exit.
pub fn apply_command(scene: &mut Scene, cmd: UiCommand) -> bool {
    match cmd {
        UiCommand::ToggleManual => {
            if !scene.toggle_manual() {
                info!("manual toggle ignored while gesture control is on");
            }
            true
        }
        UiCommand::ToggleGesture => {
            scene.toggle_gesture();
            true
        }
        UiCommand::Quit => false,
    }
}

// ════════════════════════════════════════════════════════════════════════════
// run
// ════════════════════════════════════════════════════════════════════════════

pub fn run(cfg: AppConfig) -> Result<(), AppError> {
    let sim = SimHandControl::default();

    // ── Visualizer (owns the window and writes the simulated hand) ───────
    let mut vis = Visualizer::new(sim.clone())?;

    // ── Scene ─────────────────────────────────────────────────────────────
    let mut scene = Scene::new(&cfg.scene, detector_source(cfg.detector, sim));
    if cfg.start_gesture {
        scene.set_gesture_enabled(true);
    }

    // ── Main loop ─────────────────────────────────────────────────────────
    let mut clock = FrameClock::new();
    'frames: while vis.is_open() {
        // 1. Window input
        for cmd in vis.poll_input() {
            if !apply_command(&mut scene, cmd) {
                break 'frames;
            }
        }

        // 2. Per-frame logic
        let dt = clock.tick();
        let state = scene.tick(dt);
        trace!(dt, state = state.label(), "frame");

        // 3. Render
        vis.render(&scene)?;
    }

    // Release camera and detector before the window goes away.
    scene.set_gesture_enabled(false);
    info!("viewer closed");
    Ok(())
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════
