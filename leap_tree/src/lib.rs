//! # leap_tree
//!
//! Hand-gesture control for the dual-state tree: an open hand scatters the
//! tree into a chaos cloud, a closed fist pulls every needle, ornament and
//! polaroid back onto the phyllotaxis spiral.  A software-rendered viewer
//! shows the result.
//!
//! ## Control mapping
//!
//! | Input | Gesture control | Effect |
//! |---|---|---|
//! | Open hand | on | Tree → CHAOS |
//! | Closed hand / no hand | on | Tree → FORMED |
//! | Hand position | on | Camera follows the wrist |
//! | `Space` | off | Toggle CHAOS / FORMED |
//! | `G` | either | Toggle gesture control (off snaps back to FORMED) |
//! | `Q` / `Escape` | either | Quit |
//!
//! If the camera or hand detector fails, the error is shown in the status
//! bar and gesture control switches itself off so `Space` works again.
//!
//! ## Feature flags
//!
//! * (default): **Simulation mode**, a synthetic hand driven from the keyboard.
//! * `leap`: **Hardware mode**, polls a real LeapMotion controller via LeapC.
//!
//! ### Simulated hand
//!
//! | Key | Hand |
//! |---|---|
//! | `H` | Show / hide the hand |
//! | `O` (hold) | Open hand |
//! | Arrow keys | Move the wrist |

pub mod error;
pub mod gesture;
pub mod detector;
pub mod router;
pub mod config;
pub mod scene;
pub mod visualizer;
pub mod app;

pub use config::SceneConfig;
pub use error::{AppError, GestureError};
pub use gesture::{GestureClassifier, GestureConfig, GestureState, LandmarkFrame, StatusLabel};
pub use router::ControlSignalRouter;
pub use scene::{CameraRig, Scene};
