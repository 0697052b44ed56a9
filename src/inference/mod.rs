//! Inference pipeline stages.
//!
//! ```text
//! payload ─▶ validator ─▶ window ─▶ scaler ─▶ orchestrator ─▶ encoder
//!            (reading)    (W rows)  (tensor)  (24h + 48h)    (record)
//! ```
//!
//! Each stage is a plain function or an immutable struct; sequencing,
//! locking and persistence live in `crate::pipeline`.

pub mod classifier;
pub mod encoder;
pub mod orchestrator;
pub mod scaler;
pub mod validator;
pub mod window;

use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::ArtifactLoadError;

/// Reads and deserializes a JSON model artifact.
pub(crate) fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactLoadError> {
    if !path.exists() {
        return Err(ArtifactLoadError::Missing(path.to_path_buf()));
    }

    let contents = fs::read_to_string(path).map_err(|source| ArtifactLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&contents).map_err(|e| ArtifactLoadError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
