//! Scene configuration, loaded from JSON.
//!
//! Every field has a default, so `{}` is a valid config and a file only
//! needs the values it changes:
//!
//! ```json
//! {
//!   "seed": 42,
//!   "initial_state": "chaos",
//!   "formation": { "foliage_count": 4000, "polaroid_images": 2 },
//!   "gesture":   { "openness_threshold": 0.25 }
//! }
//! ```

use std::fs;
use std::path::Path;

use dual_formation::{FormationSpec, TreeState};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::AppError;
use crate::gesture::GestureConfig;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub formation:     FormationSpec,
    pub gesture:       GestureConfig,
    /// Fixed seed for the chaos scatter; `None` draws from entropy.
    pub seed:          Option<u64>,
    pub initial_state: TreeState,
}

impl SceneConfig {
    pub fn from_json_str(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| AppError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = Self::from_json_str(&text)?;
        info!(path = %path.display(), "loaded scene config");
        Ok(cfg)
    }
}
