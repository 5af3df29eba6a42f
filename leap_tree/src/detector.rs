//! Hand detectors and the acquisition worker that runs them.
//!
//! The classifier never talks to a camera directly.  It is handed a
//! [`DetectorFactory`]; the factory runs on a worker thread (so detectors
//! need not be `Send`), walks the acquisition phases, then polls frames.
//! Everything the worker learns crosses an `mpsc` channel as a
//! [`TaggedEvent`] and is applied on the frame thread.
//!
//! Teardown: [`DetectorSession::shutdown`] clears the session's
//! [`LivenessToken`] and drops the receiver.  It joins the worker only once
//! the worker is in its poll loop; a worker still stuck in acquisition is
//! detached, so the frame thread never waits on a camera.  The worker
//! checks the token before every send and after every phase, so a slow
//! camera or model load finishing after teardown is discarded, and it
//! always calls [`HandDetector::release`] on the way out.
//!
//! Implementations:
//!
//! * [`SimHandDetector`]: a synthetic hand driven from the viewer's keys.
//! * `LeapHandDetector`: LeapMotion hardware (`leap` feature).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use glam::Vec3;
use tracing::{debug, info, warn};

use crate::error::{GestureError, GestureResult};
use crate::gesture::{LandmarkFrame, StatusLabel, FINGERTIPS, LANDMARK_COUNT, WRIST};

// ════════════════════════════════════════════════════════════════════════════
// HandDetector trait — the capture/detector capability
// ════════════════════════════════════════════════════════════════════════════

/// Result of one detector poll.
#[derive(Clone, Debug, PartialEq)]
pub enum DetectorFrame {
    Hand(LandmarkFrame),
    NoHand,
    /// Nothing new since the last poll.
    Pending,
}

/// A camera plus hand-landmark model.
///
/// Phases run in order on the worker thread.  `poll` should return within
/// a frame or two so cancellation is noticed promptly.
pub trait HandDetector {
    fn open_camera(&mut self) -> GestureResult<()>;
    fn load_model(&mut self) -> GestureResult<()>;
    fn initialize(&mut self) -> GestureResult<()>;
    fn poll(&mut self) -> GestureResult<DetectorFrame>;
    /// Release camera and model.  Called exactly once, even after a failure.
    fn release(&mut self);
}

/// Builds a detector on the worker thread.
pub type DetectorFactory = Box<dyn FnOnce() -> Box<dyn HandDetector> + Send>;

// ════════════════════════════════════════════════════════════════════════════
// Events and liveness
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone, Debug, PartialEq)]
pub enum DetectorEvent {
    Phase(StatusLabel),
    Frame(LandmarkFrame),
    NoHand,
    Failed(GestureError),
}

/// An event stamped with the session that produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct TaggedEvent {
    pub session: u64,
    pub event:   DetectorEvent,
}

/// Shared flag: live until cancelled, never revived.
#[derive(Clone, Debug)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    pub fn new() -> Self { LivenessToken(Arc::new(AtomicBool::new(true))) }

    pub fn is_live(&self) -> bool { self.0.load(Ordering::Acquire) }

    pub fn cancel(&self) { self.0.store(false, Ordering::Release) }
}

impl Default for LivenessToken {
    fn default() -> Self { Self::new() }
}

// ════════════════════════════════════════════════════════════════════════════
// DetectorSession — the frame thread's handle on a worker
// ════════════════════════════════════════════════════════════════════════════

pub struct DetectorSession {
    id:      u64,
    token:   LivenessToken,
    /// Set by the worker when acquisition is done and polling begins.
    polling: Arc<AtomicBool>,
    rx:      Option<Receiver<TaggedEvent>>,
    worker:  Option<JoinHandle<()>>,
}

impl DetectorSession {
    pub fn id(&self) -> u64 { self.id }

    pub fn is_live(&self) -> bool { self.token.is_live() }

    /// Everything queued so far; empty once cancelled.
    pub fn drain(&self) -> Vec<TaggedEvent> {
        if !self.token.is_live() {
            return Vec::new();
        }
        match &self.rx {
            Some(rx) => rx.try_iter().collect(),
            None     => Vec::new(),
        }
    }

    /// True once acquisition finished and the worker is polling frames.
    pub fn is_polling(&self) -> bool { self.polling.load(Ordering::Acquire) }

    /// Cancel and stop receiving.
    ///
    /// A polling worker is joined, so its detector is released on return.
    /// A worker still acquiring is detached; it releases the detector itself
    /// when its pending phase returns.
    pub fn shutdown(mut self) {
        self.token.cancel();
        self.rx = None;
        let Some(worker) = self.worker.take() else { return };
        if self.is_polling() {
            if worker.join().is_err() {
                warn!(session = self.id, "detector worker panicked");
            }
            debug!(session = self.id, "detector session closed");
        } else {
            debug!(session = self.id, "detector session detached during acquisition");
        }
    }
}

impl Drop for DetectorSession {
    fn drop(&mut self) {
        // Unjoined drop: the worker still exits on its next token check.
        self.token.cancel();
    }
}

/// Start a worker for `factory` and return its session handle.
pub fn spawn_detector(id: u64, factory: DetectorFactory) -> DetectorSession {
    let (tx, rx) = mpsc::channel();
    let token = LivenessToken::new();
    let polling = Arc::new(AtomicBool::new(false));
    let out = Outbox { session: id, token: token.clone(), polling: polling.clone(), tx };
    let worker = thread::Builder::new()
        .name(format!("hand-detector-{}", id))
        .spawn(move || run_worker(factory, out));

    match worker {
        Ok(handle) => DetectorSession { id, token, polling, rx: Some(rx), worker: Some(handle) },
        Err(e) => {
            // No thread: report through the channel we still own.
            let (tx, rx) = mpsc::channel();
            let _ = tx.send(TaggedEvent {
                session: id,
                event:   DetectorEvent::Failed(GestureError::DetectorLoad(e.to_string())),
            });
            DetectorSession { id, token, polling, rx: Some(rx), worker: None }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Worker
// ════════════════════════════════════════════════════════════════════════════

const IDLE_BACKOFF: Duration = Duration::from_millis(2);

struct Outbox {
    session: u64,
    token:   LivenessToken,
    polling: Arc<AtomicBool>,
    tx:      Sender<TaggedEvent>,
}

impl Outbox {
    /// False once the session is dead or the receiver is gone.
    fn send(&self, event: DetectorEvent) -> bool {
        self.token.is_live()
            && self.tx.send(TaggedEvent { session: self.session, event }).is_ok()
    }
}

fn run_worker(factory: DetectorFactory, out: Outbox) {
    let id = out.session;
    let mut detector = factory();

    if let Err(err) = drive(detector.as_mut(), &out) {
        warn!(session = id, error = %err, "hand detector stopped");
        out.send(DetectorEvent::Failed(err));
    }

    detector.release();
    debug!(session = id, "hand detector released");
}

/// Acquisition phases, then the poll loop.  `Ok` means cancelled.
fn drive(detector: &mut dyn HandDetector, out: &Outbox) -> GestureResult<()> {
    detector.open_camera()?;
    info!(session = out.session, "camera obtained");
    if !out.send(DetectorEvent::Phase(StatusLabel::CameraObtained))
        || !out.send(DetectorEvent::Phase(StatusLabel::LoadingDetector))
    {
        return Ok(());
    }

    detector.load_model()?;
    if !out.send(DetectorEvent::Phase(StatusLabel::InitializingDetector)) {
        return Ok(());
    }

    detector.initialize()?;
    info!(session = out.session, "hand detector ready");
    // Flag before announcing Ready so a streaming session is always joined.
    out.polling.store(true, Ordering::Release);
    if !out.send(DetectorEvent::Phase(StatusLabel::Ready)) {
        return Ok(());
    }

    loop {
        let sent = match detector.poll()? {
            DetectorFrame::Hand(frame) => out.send(DetectorEvent::Frame(frame)),
            DetectorFrame::NoHand      => out.send(DetectorEvent::NoHand),
            DetectorFrame::Pending     => {
                thread::sleep(IDLE_BACKOFF);
                out.token.is_live()
            }
        };
        if !sent {
            return Ok(());
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Synthetic hand geometry
// ════════════════════════════════════════════════════════════════════════════

/// A 21-point hand with its wrist at `wrist` and every fingertip exactly
/// `reach` away, fingers fanned upward in image space.
pub fn synthetic_hand(wrist: Vec3, reach: f32) -> LandmarkFrame {
    let mut points = [wrist; LANDMARK_COUNT];
    for (finger, &tip) in FINGERTIPS.iter().enumerate() {
        // Fan from −60° (thumb) to +60° (pinky) around straight up.
        let angle = (finger as f32 - 2.0) * 30.0_f32.to_radians();
        let dir = Vec3::new(angle.sin(), -angle.cos(), 0.0);
        // Joints 1..=3 of each finger sit at quarter steps toward the tip.
        for joint in 1..=4 {
            points[tip - 4 + joint] = wrist + dir * reach * joint as f32 / 4.0;
        }
    }
    points[WRIST] = wrist;
    LandmarkFrame::new(points)
}

// ════════════════════════════════════════════════════════════════════════════
// SimHandDetector — keyboard-driven hand (always available)
// ════════════════════════════════════════════════════════════════════════════

/// Fingertip reach of the simulated open hand and fist.
const SIM_OPEN_REACH:   f32 = 0.40;
const SIM_CLOSED_REACH: f32 = 0.12;

/// ~60 Hz, like a webcam feed.
const SIM_FRAME: Duration = Duration::from_millis(16);

/// The simulated hand as the viewer's keys leave it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimHand {
    pub present: bool,
    pub open:    bool,
    /// Wrist in normalised image space.
    pub wrist:   Vec3,
}

impl Default for SimHand {
    fn default() -> Self {
        SimHand { present: true, open: false, wrist: Vec3::new(0.5, 0.5, 0.0) }
    }
}

/// Shared handle the viewer writes and the detector reads.
#[derive(Clone, Debug, Default)]
pub struct SimHandControl(Arc<Mutex<SimHand>>);

impl SimHandControl {
    pub fn get(&self) -> SimHand {
        match self.0.lock() {
            Ok(h)  => *h,
            Err(p) => *p.into_inner(),
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut SimHand)) {
        match self.0.lock() {
            Ok(mut h)  => f(&mut h),
            Err(p)     => f(&mut p.into_inner()),
        }
    }
}

/// Acquisition phase a simulated detector should fail at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum SimFailure {
    Camera,
    Model,
}

pub struct SimHandDetector {
    control: SimHandControl,
    fail_at: Option<SimFailure>,
}

impl SimHandDetector {
    pub fn new(control: SimHandControl, fail_at: Option<SimFailure>) -> Self {
        SimHandDetector { control, fail_at }
    }

    pub fn factory(control: SimHandControl, fail_at: Option<SimFailure>) -> DetectorFactory {
        Box::new(move || Box::new(SimHandDetector::new(control, fail_at)) as Box<dyn HandDetector>)
    }
}

impl HandDetector for SimHandDetector {
    fn open_camera(&mut self) -> GestureResult<()> {
        match self.fail_at {
            Some(SimFailure::Camera) => {
                Err(GestureError::Acquisition("Permission denied (simulated)".into()))
            }
            _ => Ok(()),
        }
    }

    fn load_model(&mut self) -> GestureResult<()> {
        match self.fail_at {
            Some(SimFailure::Model) => {
                Err(GestureError::DetectorLoad("model download failed (simulated)".into()))
            }
            _ => Ok(()),
        }
    }

    fn initialize(&mut self) -> GestureResult<()> { Ok(()) }

    fn poll(&mut self) -> GestureResult<DetectorFrame> {
        thread::sleep(SIM_FRAME);
        let hand = self.control.get();
        if !hand.present {
            return Ok(DetectorFrame::NoHand);
        }
        let reach = if hand.open { SIM_OPEN_REACH } else { SIM_CLOSED_REACH };
        Ok(DetectorFrame::Hand(synthetic_hand(hand.wrist, reach)))
    }

    fn release(&mut self) {}
}

// ════════════════════════════════════════════════════════════════════════════
// LeapHandDetector — real hardware (feature = "leap")
// ════════════════════════════════════════════════════════════════════════════

/// LeapMotion controller mapped onto the 21-landmark layout.
///
/// Landmark 0 is the palm centre; each finger contributes the far joints of
/// its metacarpal, proximal, intermediate and distal bones.  Millimetres are
/// mapped into the unit square over a 400 mm box centred 200 mm above the
/// device, with image `y` pointing down.
#[cfg(feature = "leap")]
pub struct LeapHandDetector {
    connection: Option<leaprs::Connection>,
}

#[cfg(feature = "leap")]
impl LeapHandDetector {
    const BOX_MM:      f32 = 400.0;
    const CENTER_Y_MM: f32 = 200.0;
    const POLL_MS:     u32 = 100;

    pub fn new() -> Self { LeapHandDetector { connection: None } }

    pub fn factory() -> DetectorFactory {
        Box::new(|| Box::new(LeapHandDetector::new()) as Box<dyn HandDetector>)
    }

    fn normalise(x: f32, y: f32, z: f32) -> Vec3 {
        Vec3::new(
            0.5 + x / Self::BOX_MM,
            0.5 - (y - Self::CENTER_Y_MM) / Self::BOX_MM,
            z / Self::BOX_MM,
        )
    }

    fn landmarks(hand: &leaprs::Hand) -> GestureResult<LandmarkFrame> {
        let palm = hand.palm().position();
        let mut points = vec![Self::normalise(palm.x, palm.y, palm.z)];
        for digit in hand.digits() {
            for joint in [
                digit.metacarpal().next_joint(),
                digit.proximal().next_joint(),
                digit.intermediate().next_joint(),
                digit.distal().next_joint(),
            ] {
                points.push(Self::normalise(joint.x, joint.y, joint.z));
            }
        }
        LandmarkFrame::from_slice(&points)
    }
}

#[cfg(feature = "leap")]
impl HandDetector for LeapHandDetector {
    fn open_camera(&mut self) -> GestureResult<()> {
        use leaprs::{Connection, ConnectionConfig};
        let mut connection = Connection::create(ConnectionConfig::default())
            .map_err(|e| GestureError::Acquisition(format!("LeapC connection: {:?}", e)))?;
        connection
            .open()
            .map_err(|e| GestureError::Acquisition(format!("LeapMotion device: {:?}", e)))?;
        self.connection = Some(connection);
        Ok(())
    }

    // The tracking model lives in the Leap service; nothing to load.
    fn load_model(&mut self) -> GestureResult<()> { Ok(()) }

    fn initialize(&mut self) -> GestureResult<()> {
        match self.connection {
            Some(_) => Ok(()),
            None    => Err(GestureError::DetectorLoad("no LeapC connection".into())),
        }
    }

    fn poll(&mut self) -> GestureResult<DetectorFrame> {
        use leaprs::Event;
        let Some(connection) = self.connection.as_mut() else {
            return Err(GestureError::DetectorLoad("no LeapC connection".into()));
        };
        let msg = match connection.poll(Self::POLL_MS) {
            Ok(m)  => m,
            Err(_) => return Ok(DetectorFrame::Pending),
        };
        if let Event::Tracking(frame) = msg.event() {
            return match frame.hands().next() {
                Some(hand) => Ok(DetectorFrame::Hand(Self::landmarks(&hand)?)),
                None       => Ok(DetectorFrame::NoHand),
            };
        }
        Ok(DetectorFrame::Pending)
    }

    fn release(&mut self) {
        self.connection = None;
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Test support
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::gesture::{GestureClassifier, GestureState};
    use std::time::Instant;

    /// Wrist at `wrist`, fingertips `reach` away.
    pub fn hand_frame(wrist: Vec3, reach: f32) -> LandmarkFrame {
        synthetic_hand(wrist, reach)
    }

    /// Canned behaviour for a [`ScriptedDetector`].
    pub struct Script {
        camera_delay: Duration,
        camera:       GestureResult<()>,
        model:        GestureResult<()>,
        frames:       Vec<Option<LandmarkFrame>>,
        released:     Arc<AtomicBool>,
    }

    impl Script {
        /// Acquisition succeeds, then `frames` repeat forever (`None` = no hand).
        pub fn frames(frames: Vec<Option<LandmarkFrame>>) -> Self {
            Script {
                camera_delay: Duration::ZERO,
                camera:       Ok(()),
                model:        Ok(()),
                frames,
                released:     Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn failing_camera(msg: &str) -> Self {
            Script { camera: Err(GestureError::Acquisition(msg.into())), ..Self::frames(vec![]) }
        }

        pub fn failing_model(msg: &str) -> Self {
            Script { model: Err(GestureError::DetectorLoad(msg.into())), ..Self::frames(vec![]) }
        }

        /// `open_camera` blocks for `delay` before succeeding.
        pub fn slow_camera(delay: Duration, frames: Vec<Option<LandmarkFrame>>) -> Self {
            Script { camera_delay: delay, ..Self::frames(frames) }
        }

        pub fn released_flag(&self) -> Arc<AtomicBool> { self.released.clone() }
    }

    pub struct ScriptedDetector {
        script: Script,
        cursor: usize,
    }

    impl ScriptedDetector {
        pub fn factory(script: Script) -> DetectorFactory {
            Box::new(move || Box::new(ScriptedDetector { script, cursor: 0 }) as Box<dyn HandDetector>)
        }
    }

    impl HandDetector for ScriptedDetector {
        fn open_camera(&mut self) -> GestureResult<()> {
            thread::sleep(self.script.camera_delay);
            self.script.camera.clone()
        }
        fn load_model(&mut self)  -> GestureResult<()> { self.script.model.clone() }
        fn initialize(&mut self)  -> GestureResult<()> { Ok(()) }

        fn poll(&mut self) -> GestureResult<DetectorFrame> {
            thread::sleep(Duration::from_millis(1));
            if self.script.frames.is_empty() {
                return Ok(DetectorFrame::Pending);
            }
            let next = self.script.frames[self.cursor % self.script.frames.len()];
            self.cursor += 1;
            Ok(match next {
                Some(f) => DetectorFrame::Hand(f),
                None    => DetectorFrame::NoHand,
            })
        }

        fn release(&mut self) {
            self.script.released.store(true, Ordering::SeqCst);
        }
    }

    /// Pump until `pred` holds or two seconds pass.
    pub fn wait_for(c: &mut GestureClassifier, pred: impl Fn(&GestureState) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            c.pump();
            if pred(c.state()) {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

// ════════════════════════════════════════════════════════════════════════════
// Tests
// ════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::gesture::openness;
    use approx::assert_relative_eq;
    use std::time::Instant;

    fn collect_until(session: &DetectorSession, pred: impl Fn(&[TaggedEvent]) -> bool) -> Vec<TaggedEvent> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut all = Vec::new();
        while Instant::now() < deadline && !pred(all.as_slice()) {
            all.extend(session.drain());
            thread::sleep(Duration::from_millis(2));
        }
        all
    }

    #[test]
    fn synthetic_hand_reach() {
        let f = synthetic_hand(Vec3::new(0.4, 0.6, 0.0), 0.33);
        assert_relative_eq!(openness(&f), 0.33, epsilon = 1e-5);
        assert_eq!(f.wrist(), Vec3::new(0.4, 0.6, 0.0));
    }

    #[test]
    fn phases_arrive_in_order() {
        let script = Script::frames(vec![None]);
        let session = spawn_detector(7, ScriptedDetector::factory(script));
        let events = collect_until(&session, |evs| {
            evs.iter().any(|e| e.event == DetectorEvent::NoHand)
        });
        session.shutdown();

        let phases: Vec<StatusLabel> = events
            .iter()
            .filter_map(|e| match e.event {
                DetectorEvent::Phase(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(
            phases,
            vec![
                StatusLabel::CameraObtained,
                StatusLabel::LoadingDetector,
                StatusLabel::InitializingDetector,
                StatusLabel::Ready,
            ]
        );
        assert!(events.iter().all(|e| e.session == 7));
    }

    #[test]
    fn failure_is_reported_and_detector_released() {
        let script = Script::failing_camera("denied");
        let released = script.released_flag();
        let session = spawn_detector(1, ScriptedDetector::factory(script));
        let events = collect_until(&session, |evs| {
            evs.iter().any(|e| matches!(e.event, DetectorEvent::Failed(_)))
        });
        session.shutdown();
        assert!(events
            .iter()
            .any(|e| e.event == DetectorEvent::Failed(GestureError::Acquisition("denied".into()))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn shutdown_during_acquisition_does_not_wait() {
        let script = Script::slow_camera(Duration::from_millis(600), vec![None]);
        let released = script.released_flag();
        let session = spawn_detector(3, ScriptedDetector::factory(script));
        thread::sleep(Duration::from_millis(30));
        assert!(!session.is_polling());

        let t0 = Instant::now();
        session.shutdown();
        assert!(t0.elapsed() < Duration::from_millis(100), "took {:?}", t0.elapsed());

        // The detached worker still releases once the camera call returns.
        let deadline = Instant::now() + Duration::from_secs(3);
        while !released.load(Ordering::SeqCst) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn polling_session_is_joined() {
        let script = Script::frames(vec![None]);
        let released = script.released_flag();
        let session = spawn_detector(4, ScriptedDetector::factory(script));
        let deadline = Instant::now() + Duration::from_secs(2);
        while !session.is_polling() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        assert!(session.is_polling());
        session.shutdown();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn cancelled_session_drains_nothing() {
        let session = spawn_detector(2, ScriptedDetector::factory(Script::frames(vec![None])));
        session.token.cancel();
        thread::sleep(Duration::from_millis(20));
        assert!(session.drain().is_empty());
        assert!(!session.is_live());
        session.shutdown();
    }

    #[test]
    fn sim_detector_follows_control() {
        let control = SimHandControl::default();
        let mut det = SimHandDetector::new(control.clone(), None);

        control.update(|h| { h.open = true; h.wrist = Vec3::new(0.2, 0.3, 0.0); });
        match det.poll().unwrap() {
            DetectorFrame::Hand(f) => {
                assert!(openness(&f) > 0.3);
                assert_eq!(f.wrist(), Vec3::new(0.2, 0.3, 0.0));
            }
            other => panic!("expected hand, got {:?}", other),
        }

        control.update(|h| h.present = false);
        assert_eq!(det.poll().unwrap(), DetectorFrame::NoHand);
    }

    #[test]
    fn sim_detector_simulated_failures() {
        let control = SimHandControl::default();
        let mut cam = SimHandDetector::new(control.clone(), Some(SimFailure::Camera));
        assert!(matches!(cam.open_camera(), Err(GestureError::Acquisition(_))));
        let mut model = SimHandDetector::new(control, Some(SimFailure::Model));
        assert!(model.open_camera().is_ok());
        assert!(matches!(model.load_model(), Err(GestureError::DetectorLoad(_))));
    }

    #[test]
    fn liveness_token_is_shared_and_one_way() {
        let a = LivenessToken::new();
        let b = a.clone();
        assert!(b.is_live());
        a.cancel();
        assert!(!b.is_live());
    }
}
