//! Error types.
//!
//! Gesture failures never take the render loop down: they end up as a
//! message on the gesture state and the scene falls back to the manual
//! toggle.  [`AppError`] covers the things that do stop the binary.

use std::path::PathBuf;

use thiserror::Error;

/// Failure anywhere in the hand-tracking pipeline.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GestureError {
    /// Camera permission denied or no capture device.
    #[error("camera unavailable: {0}")]
    Acquisition(String),

    /// The hand detector could not be loaded or initialised.
    #[error("hand detector failed to load: {0}")]
    DetectorLoad(String),

    /// A detector delivered a frame that is not a 21-point hand.
    #[error("malformed landmark frame: {0}")]
    Classification(String),
}

/// Fatal application errors.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("window error: {0}")]
    Window(String),
}

pub type GestureResult<T> = Result<T, GestureError>;
