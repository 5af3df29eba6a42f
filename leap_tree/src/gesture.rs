//! Hand-gesture classification.
//!
//! A detector (see [`crate::detector`]) delivers 21-point hand landmark
//! frames in normalised image space.  The classifier reduces each frame to
//! two signals:
//!
//! * **Openness**: mean palm-to-fingertip distance over the five fingertips;
//!   the hand is open when it exceeds [`GestureConfig::openness_threshold`].
//! * **Hand centre**: the wrist mapped to symmetric device-like coordinates,
//!   `((x − 0.5)·2, −(y − 0.5)·2, −z·z_scale)`.
//!
//! All state lives in [`GestureState`] and is only mutated on the frame
//! thread, inside [`GestureClassifier::pump`] or the `on_*` callbacks.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::detector::{spawn_detector, DetectorEvent, DetectorFactory, DetectorSession};
use crate::error::GestureError;

// ════════════════════════════════════════════════════════════════════════════
// Landmarks
// ════════════════════════════════════════════════════════════════════════════

pub const LANDMARK_COUNT: usize = 21;

/// Wrist / palm base.
pub const WRIST: usize = 0;

/// Thumb, index, middle, ring and pinky tips.
pub const FINGERTIPS: [usize; 5] = [4, 8, 12, 16, 20];

/// One hand, 21 keypoints: `x`, `y` in `[0, 1]` image space, `z` relative depth.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandmarkFrame {
    points: [Vec3; LANDMARK_COUNT],
}

impl LandmarkFrame {
    pub fn new(points: [Vec3; LANDMARK_COUNT]) -> Self {
        LandmarkFrame { points }
    }

    /// Accept a detector's landmark list; anything but 21 points is malformed.
    pub fn from_slice(points: &[Vec3]) -> Result<Self, GestureError> {
        let points: [Vec3; LANDMARK_COUNT] = points.try_into().map_err(|_| {
            GestureError::Classification(format!(
                "expected {} landmarks, got {}",
                LANDMARK_COUNT,
                points.len()
            ))
        })?;
        Ok(LandmarkFrame { points })
    }

    pub fn points(&self) -> &[Vec3; LANDMARK_COUNT] { &self.points }

    pub fn wrist(&self) -> Vec3 { self.points[WRIST] }

    pub fn is_finite(&self) -> bool {
        self.points.iter().all(|p| p.is_finite())
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureConfig
// ════════════════════════════════════════════════════════════════════════════

/// Empirical thresholds, tuned against a webcam at arm's length.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Mean palm-to-fingertip distance above which the hand counts as open.
    pub openness_threshold: f32,
    /// Multiplier for the raw landmark depth, which is otherwise near zero.
    pub z_scale:            f32,
    /// Consecutive empty frames before the status reads "no hand".
    pub no_hand_debounce:   u32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        GestureConfig {
            openness_threshold: 0.3,
            z_scale:            10.0,
            no_hand_debounce:   1,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Frame metrics
// ════════════════════════════════════════════════════════════════════════════

/// Mean Euclidean distance from the palm base to each fingertip.
pub fn openness(frame: &LandmarkFrame) -> f32 {
    let palm = frame.wrist();
    let sum: f32 = FINGERTIPS.iter().map(|&i| frame.points[i].distance(palm)).sum();
    sum / FINGERTIPS.len() as f32
}

/// Wrist position in symmetric device-like coordinates.
pub fn hand_center(frame: &LandmarkFrame, z_scale: f32) -> Vec3 {
    let w = frame.wrist();
    Vec3::new((w.x - 0.5) * 2.0, -(w.y - 0.5) * 2.0, -w.z * z_scale)
}

/// What one frame says about the hand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HandReading {
    pub openness: f32,
    pub is_open:  bool,
    pub center:   Vec3,
}

/// Classify a frame; `None` when any coordinate is NaN or infinite.
pub fn classify(frame: &LandmarkFrame, config: &GestureConfig) -> Option<HandReading> {
    if !frame.is_finite() {
        return None;
    }
    let openness = openness(frame);
    Some(HandReading {
        openness,
        is_open: openness > config.openness_threshold,
        center:  hand_center(frame, config.z_scale),
    })
}

// ════════════════════════════════════════════════════════════════════════════
// Status
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StatusLabel {
    Inactive,
    RequestingCamera,
    CameraObtained,
    LoadingDetector,
    InitializingDetector,
    Ready,
    HandDetected,
    NoHandDetected,
    Error,
}

impl StatusLabel {
    pub fn text(self) -> &'static str {
        match self {
            StatusLabel::Inactive             => "Inactive",
            StatusLabel::RequestingCamera     => "Requesting camera...",
            StatusLabel::CameraObtained       => "Camera obtained",
            StatusLabel::LoadingDetector      => "Loading hand detector...",
            StatusLabel::InitializingDetector => "Initializing hand detector...",
            StatusLabel::Ready                => "Ready - waiting for hand...",
            StatusLabel::HandDetected         => "Hand detected!",
            StatusLabel::NoHandDetected       => "No hand detected",
            StatusLabel::Error                => "Error",
        }
    }

    /// Detector is up and frames are flowing.
    pub fn is_streaming(self) -> bool {
        matches!(self, StatusLabel::Ready | StatusLabel::HandDetected | StatusLabel::NoHandDetected)
    }

}

// ════════════════════════════════════════════════════════════════════════════
// GestureState
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub struct GestureState {
    pub is_open:     bool,
    pub hand_center: Vec3,
    pub status:      StatusLabel,
    pub error:       Option<String>,
}

impl Default for GestureState {
    fn default() -> Self {
        GestureState {
            is_open:     false,
            hand_center: Vec3::ZERO,
            status:      StatusLabel::Inactive,
            error:       None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// GestureClassifier
// ════════════════════════════════════════════════════════════════════════════

/// Owns the gesture state and at most one running detector session.
pub struct GestureClassifier {
    config:         GestureConfig,
    state:          GestureState,
    session:        Option<DetectorSession>,
    next_session:   u64,
    no_hand_streak: u32,
}

impl GestureClassifier {
    pub fn new(config: GestureConfig) -> Self {
        GestureClassifier {
            config,
            state:          GestureState::default(),
            session:        None,
            next_session:   1,
            no_hand_streak: 0,
        }
    }

    pub fn state(&self) -> &GestureState { &self.state }

    /// True while a detector session is running.
    pub fn is_active(&self) -> bool { self.session.is_some() }

    /// Begin acquisition with a fresh detector.
    ///
    /// Any previous session is torn down first, and a previous error is
    /// cleared.  Acquisition continues on a worker thread; call
    /// [`pump`](Self::pump) each frame to apply its progress.
    pub fn start(&mut self, factory: DetectorFactory) {
        self.shutdown_session();

        let id = self.next_session;
        self.next_session += 1;

        self.state.is_open = false;
        self.state.error   = None;
        self.state.status  = StatusLabel::RequestingCamera;
        self.no_hand_streak = 0;

        info!(session = id, "starting hand detection");
        self.session = Some(spawn_detector(id, factory));
    }

    /// Stop landmark ingestion and release the detector.
    ///
    /// Returns once the worker has released camera and detector.  The hand
    /// centre is kept so a later restart doesn't jump.
    pub fn stop(&mut self) {
        if self.session.is_some() {
            info!("stopping hand detection");
        }
        self.shutdown_session();
        self.state.is_open = false;
        self.state.error   = None;
        self.state.status  = StatusLabel::Inactive;
        self.no_hand_streak = 0;
    }

    /// Apply every event the live session has queued.  Returns how many.
    pub fn pump(&mut self) -> usize {
        let Some(session) = self.session.as_ref() else { return 0 };
        let id = session.id();
        let events = session.drain();
        let n = events.len();
        for tagged in events {
            // A session torn down mid-drain (error) leaves the rest stale.
            if self.session.as_ref().map(DetectorSession::id) != Some(tagged.session) {
                trace!(session = tagged.session, live = id, "dropping stale detector event");
                continue;
            }
            self.apply(tagged.event);
        }
        n
    }

    fn apply(&mut self, event: DetectorEvent) {
        match event {
            DetectorEvent::Phase(label)     => self.on_phase(label),
            DetectorEvent::Frame(frame)     => self.on_landmark_frame(&frame),
            DetectorEvent::NoHand           => self.on_no_hand(),
            DetectorEvent::Failed(err)      => self.on_error(err.to_string()),
        }
    }

    fn on_phase(&mut self, label: StatusLabel) {
        if self.state.status == StatusLabel::Error || self.state.status == StatusLabel::Inactive {
            return;
        }
        debug!(status = label.text(), "detector phase");
        self.state.status = label;
    }

    /// Classify one landmark frame.
    ///
    /// Ignored unless the detector is streaming.  Frames with non-finite
    /// coordinates count as "no hand".
    pub fn on_landmark_frame(&mut self, frame: &LandmarkFrame) {
        if !self.state.status.is_streaming() {
            return;
        }
        match classify(frame, &self.config) {
            Some(reading) => {
                if reading.is_open != self.state.is_open {
                    debug!(open = reading.is_open, openness = reading.openness, "hand openness changed");
                }
                self.state.is_open     = reading.is_open;
                self.state.hand_center = reading.center;
                self.state.status      = StatusLabel::HandDetected;
                self.no_hand_streak    = 0;
            }
            None => {
                warn!("non-finite landmark frame treated as no hand");
                self.on_no_hand();
            }
        }
    }

    /// The detector saw no hand this frame.
    pub fn on_no_hand(&mut self) {
        if !self.state.status.is_streaming() {
            return;
        }
        self.state.is_open = false;
        self.no_hand_streak = self.no_hand_streak.saturating_add(1);
        if self.no_hand_streak >= self.config.no_hand_debounce.max(1) {
            self.state.status = StatusLabel::NoHandDetected;
        }
    }

    /// Terminal failure: record the message and stop ingesting frames.
    pub fn on_error(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(error = %message, "hand detection failed");
        self.shutdown_session();
        self.state.is_open = false;
        self.state.status  = StatusLabel::Error;
        self.state.error   = Some(message);
    }

    fn shutdown_session(&mut self) {
        if let Some(session) = self.session.take() {
            session.shutdown();
        }
    }
}

impl Drop for GestureClassifier {
    fn drop(&mut self) {
        self.shutdown_session();
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::testing::{hand_frame, wait_for, Script, ScriptedDetector};
    use approx::assert_relative_eq;
    use std::time::{Duration, Instant};

    fn streaming() -> GestureClassifier {
        let mut c = GestureClassifier::new(GestureConfig::default());
        c.state.status = StatusLabel::Ready;
        c
    }

    #[test]
    fn closed_hand_is_not_open() {
        let mut c = streaming();
        c.on_landmark_frame(&hand_frame(Vec3::new(0.5, 0.5, 0.0), 0.1));
        assert!(!c.state().is_open);
        assert_eq!(c.state().status, StatusLabel::HandDetected);
    }

    #[test]
    fn open_hand_is_open() {
        let mut c = streaming();
        c.on_landmark_frame(&hand_frame(Vec3::new(0.5, 0.5, 0.0), 0.4));
        assert!(c.state().is_open);
    }

    #[test]
    fn openness_is_mean_tip_distance() {
        let f = hand_frame(Vec3::new(0.3, 0.6, 0.0), 0.25);
        assert_relative_eq!(openness(&f), 0.25, epsilon = 1e-5);
    }

    #[test]
    fn center_mapping() {
        let f = hand_frame(Vec3::new(0.75, 0.25, -0.02), 0.2);
        let c = hand_center(&f, 10.0);
        assert_relative_eq!(c.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(c.y, 0.5, epsilon = 1e-6);
        assert_relative_eq!(c.z, 0.2, epsilon = 1e-6);
    }

    #[test]
    fn no_hand_clears_open_keeps_center() {
        let mut c = streaming();
        c.on_landmark_frame(&hand_frame(Vec3::new(0.2, 0.8, 0.0), 0.4));
        let center = c.state().hand_center;
        assert!(c.state().is_open);

        c.on_no_hand();
        assert!(!c.state().is_open);
        assert_eq!(c.state().hand_center, center);
        assert_eq!(c.state().status, StatusLabel::NoHandDetected);
    }

    #[test]
    fn nan_frame_counts_as_no_hand() {
        let mut c = streaming();
        c.on_landmark_frame(&hand_frame(Vec3::new(0.5, 0.5, 0.0), 0.4));
        let center = c.state().hand_center;

        let mut pts = *hand_frame(Vec3::new(0.5, 0.5, 0.0), 0.4).points();
        pts[8].x = f32::NAN;
        c.on_landmark_frame(&LandmarkFrame::new(pts));

        assert!(!c.state().is_open);
        assert_eq!(c.state().hand_center, center);
        assert!(c.state().hand_center.is_finite());
    }

    #[test]
    fn no_hand_status_debounced() {
        let cfg = GestureConfig { no_hand_debounce: 3, ..GestureConfig::default() };
        let mut c = GestureClassifier::new(cfg);
        c.state.status = StatusLabel::Ready;
        c.on_landmark_frame(&hand_frame(Vec3::splat(0.5), 0.4));

        c.on_no_hand();
        c.on_no_hand();
        assert_eq!(c.state().status, StatusLabel::HandDetected);
        assert!(!c.state().is_open);
        c.on_no_hand();
        assert_eq!(c.state().status, StatusLabel::NoHandDetected);
    }

    #[test]
    fn frames_ignored_unless_streaming() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        c.on_landmark_frame(&hand_frame(Vec3::new(0.9, 0.1, 0.0), 0.4));
        assert_eq!(c.state(), &GestureState::default());
    }

    #[test]
    fn error_is_terminal() {
        let mut c = streaming();
        c.on_error("camera unplugged");
        assert_eq!(c.state().status, StatusLabel::Error);
        assert_eq!(c.state().error.as_deref(), Some("camera unplugged"));

        c.on_landmark_frame(&hand_frame(Vec3::splat(0.5), 0.4));
        assert!(!c.state().is_open);
        assert_eq!(c.state().status, StatusLabel::Error);
    }

    #[test]
    fn wrong_landmark_count_is_malformed() {
        let err = LandmarkFrame::from_slice(&[Vec3::ZERO; 20]).unwrap_err();
        assert!(matches!(err, GestureError::Classification(_)));
        assert!(LandmarkFrame::from_slice(&[Vec3::ZERO; 21]).is_ok());
    }

    #[test]
    fn config_threshold_is_respected() {
        let cfg = GestureConfig { openness_threshold: 0.5, ..GestureConfig::default() };
        let reading = classify(&hand_frame(Vec3::splat(0.5), 0.4), &cfg).unwrap();
        assert!(!reading.is_open);
    }

    // ── with a detector worker ────────────────────────────────────────────

    #[test]
    fn acquisition_reaches_hand_detected() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        let script = Script::frames(vec![Some(hand_frame(Vec3::splat(0.5), 0.4))]);
        c.start(ScriptedDetector::factory(script));
        assert_eq!(c.state().status, StatusLabel::RequestingCamera);

        assert!(wait_for(&mut c, |s| s.status == StatusLabel::HandDetected));
        assert!(c.state().is_open);
        c.stop();
        assert_eq!(c.state().status, StatusLabel::Inactive);
        assert!(!c.is_active());
    }

    #[test]
    fn camera_failure_surfaces_message() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        let script = Script::failing_camera("permission denied");
        c.start(ScriptedDetector::factory(script));

        assert!(wait_for(&mut c, |s| s.status == StatusLabel::Error));
        let msg = c.state().error.clone().unwrap();
        assert!(msg.contains("permission denied"), "{}", msg);
        assert!(!c.is_active());
    }

    #[test]
    fn detector_load_failure_surfaces_message() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        c.start(ScriptedDetector::factory(Script::failing_model("cdn unreachable")));
        assert!(wait_for(&mut c, |s| s.status == StatusLabel::Error));
        assert!(c.state().error.as_deref().unwrap().contains("cdn unreachable"));
    }

    #[test]
    fn restart_clears_error() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        c.start(ScriptedDetector::factory(Script::failing_camera("busy")));
        assert!(wait_for(&mut c, |s| s.status == StatusLabel::Error));

        c.start(ScriptedDetector::factory(Script::frames(vec![None])));
        assert!(c.state().error.is_none());
        assert!(wait_for(&mut c, |s| s.status == StatusLabel::NoHandDetected));
        c.stop();
    }

    #[test]
    fn stop_releases_detector() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        let script = Script::frames(vec![Some(hand_frame(Vec3::splat(0.5), 0.1))]);
        let released = script.released_flag();
        c.start(ScriptedDetector::factory(script));
        assert!(wait_for(&mut c, |s| s.status.is_streaming()));

        c.stop();
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn stop_during_slow_camera_returns_promptly() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        let script = Script::slow_camera(Duration::from_millis(1500), vec![None]);
        let released = script.released_flag();
        c.start(ScriptedDetector::factory(script));
        std::thread::sleep(Duration::from_millis(50));

        let t0 = Instant::now();
        c.stop();
        let ms = t0.elapsed().as_millis();
        assert!(ms < 100, "stop blocked for {} ms", ms);
        assert_eq!(c.state().status, StatusLabel::Inactive);

        // Restarting while the old camera call is still pending is fine too.
        c.start(ScriptedDetector::factory(Script::frames(vec![None])));
        assert!(wait_for(&mut c, |s| s.status.is_streaming()));
        c.stop();

        let deadline = Instant::now() + Duration::from_secs(3);
        while !released.load(std::sync::atomic::Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(released.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn late_events_after_stop_are_ignored() {
        let mut c = GestureClassifier::new(GestureConfig::default());
        let script = Script::frames(vec![Some(hand_frame(Vec3::splat(0.5), 0.4))]);
        c.start(ScriptedDetector::factory(script));
        c.stop();
        c.pump();
        assert_eq!(c.state().status, StatusLabel::Inactive);
        assert!(!c.state().is_open);
    }
}
