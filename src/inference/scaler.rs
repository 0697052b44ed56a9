//! Feature scaler: fitted, immutable affine normalization.
//!
//! Artifact format (`models/scaler.json`):
//!
//! ```json
//! { "version": "2024.05", "kind": "standard",
//!   "mean":  [t, h, r, p, s],
//!   "scale": [t, h, r, p, s] }
//! ```
//!
//! `standard` computes `(x - mean) / scale`; `min_max` computes
//! `x * scale + min`. Both reduce to `x * factor + offset` per feature,
//! precomputed at load time.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::read_artifact;
use super::window::RollingWindow;
use crate::error::ArtifactLoadError;
use crate::model::{FEATURE_COUNT, FEATURE_NAMES, FeatureVector};

#[derive(Debug, Deserialize)]
struct ScalerArtifact {
    version: String,
    #[serde(flatten)]
    params: ScalerParams,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ScalerParams {
    Standard { mean: Vec<f64>, scale: Vec<f64> },
    MinMax { min: Vec<f64>, scale: Vec<f64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalerKind {
    Standard,
    MinMax,
}

/// Normalized model input of shape (1, timesteps, 5). The batch dimension
/// is always one and left implicit.
#[derive(Debug, Clone, PartialEq)]
pub struct InputTensor {
    timesteps: Vec<FeatureVector>,
}

impl InputTensor {
    pub fn new(timesteps: Vec<FeatureVector>) -> Self {
        Self { timesteps }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (1, self.timesteps.len(), FEATURE_COUNT)
    }

    pub fn timesteps(&self) -> &[FeatureVector] {
        &self.timesteps
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScalerModel {
    version: String,
    kind: ScalerKind,
    factor: FeatureVector,
    offset: FeatureVector,
}

impl ScalerModel {
    /// Standard-score scaler from fitted mean and scale.
    pub fn standard(
        version: impl Into<String>,
        mean: FeatureVector,
        scale: FeatureVector,
    ) -> Result<Self, String> {
        let mut factor = [0.0; FEATURE_COUNT];
        let mut offset = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            if scale[i] == 0.0 || !scale[i].is_finite() || !mean[i].is_finite() {
                return Err(format!("{}: scale must be finite and non-zero", FEATURE_NAMES[i]));
            }
            factor[i] = 1.0 / scale[i];
            offset[i] = -mean[i] / scale[i];
        }
        Ok(Self {
            version: version.into(),
            kind: ScalerKind::Standard,
            factor,
            offset,
        })
    }

    /// Min-max scaler from fitted `min_` and `scale_` terms.
    pub fn min_max(
        version: impl Into<String>,
        min: FeatureVector,
        scale: FeatureVector,
    ) -> Result<Self, String> {
        let non_finite = |i: &usize| !min[*i].is_finite() || !scale[*i].is_finite();
        if let Some(i) = (0..FEATURE_COUNT).find(non_finite) {
            return Err(format!("{}: parameters must be finite", FEATURE_NAMES[i]));
        }
        Ok(Self {
            version: version.into(),
            kind: ScalerKind::MinMax,
            factor: scale,
            offset: min,
        })
    }

    /// Loads a fitted scaler artifact.
    pub fn load(path: &Path) -> Result<Self, ArtifactLoadError> {
        let artifact: ScalerArtifact = read_artifact(path)?;
        let invalid = |reason: String| ArtifactLoadError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        let model = match artifact.params {
            ScalerParams::Standard { mean, scale } => {
                let mean = to_features("mean", &mean).map_err(invalid)?;
                let scale = to_features("scale", &scale).map_err(invalid)?;
                Self::standard(artifact.version, mean, scale)
            }
            ScalerParams::MinMax { min, scale } => {
                let min = to_features("min", &min).map_err(invalid)?;
                let scale = to_features("scale", &scale).map_err(invalid)?;
                Self::min_max(artifact.version, min, scale)
            }
        }
        .map_err(invalid)?;

        info!(
            path = %path.display(),
            version = %model.version,
            kind = ?model.kind,
            "Loaded scaler"
        );
        Ok(model)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn kind(&self) -> ScalerKind {
        self.kind
    }

    pub fn transform_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            out[i] = row[i] * self.factor[i] + self.offset[i];
        }
        out
    }

    /// Scales every timestep, preserving order and length.
    pub fn transform(&self, window: &RollingWindow) -> InputTensor {
        InputTensor::new(
            window
                .feature_rows()
                .iter()
                .map(|row| self.transform_row(row))
                .collect(),
        )
    }
}

fn to_features(name: &str, values: &[f64]) -> Result<FeatureVector, String> {
    FeatureVector::try_from(values).map_err(|_| {
        format!("{} has {} values, expected {}", name, values.len(), FEATURE_COUNT)
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
