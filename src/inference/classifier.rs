//! Horizon classifiers.
//!
//! The pipeline treats a classifier as an opaque function from a normalized
//! (1, T, 5) tensor to a probability vector over the three risk classes.
//! `PooledDenseClassifier` is the artifact-backed implementation shipped
//! with the service; anything else (an ONNX session, a remote model) only
//! needs to implement `Classifier`.

use serde::Deserialize;
use std::path::Path;
use tracing::info;

use super::read_artifact;
use super::scaler::InputTensor;
use crate::error::{ArtifactLoadError, InferenceError};
use crate::model::{FEATURE_COUNT, RISK_CLASSES};

/// Interface for a pretrained horizon classifier.
pub trait Classifier: Send + Sync {
    /// Scores one window. Implementations must not mutate shared state.
    fn predict(&self, input: &InputTensor) -> Result<Vec<f64>, InferenceError>;

    fn name(&self) -> &str;

    fn version(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Artifact format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ClassifierArtifact {
    version: String,
    kind: String,
    #[serde(default)]
    input_timesteps: Option<usize>,
    hidden: DenseLayer,
    output: DenseLayer,
}

/// Fully connected layer: `weights[out][in]`, `bias[out]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl DenseLayer {
    fn check(&self, name: &str, inputs: usize) -> Result<(), String> {
        if self.weights.is_empty() {
            return Err(format!("{} layer has no units", name));
        }
        if self.weights.len() != self.bias.len() {
            return Err(format!(
                "{} layer has {} weight rows but {} biases",
                name,
                self.weights.len(),
                self.bias.len()
            ));
        }
        if let Some(row) = self.weights.iter().position(|w| w.len() != inputs) {
            return Err(format!(
                "{} layer row {} has {} inputs, expected {}",
                name,
                row,
                self.weights[row].len(),
                inputs
            ));
        }
        let all_finite = self.weights.iter().flatten().chain(&self.bias).all(|v| v.is_finite());
        if !all_finite {
            return Err(format!("{} layer contains non-finite parameters", name));
        }
        Ok(())
    }

    fn units(&self) -> usize {
        self.weights.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Pooled dense classifier
// ---------------------------------------------------------------------------

/// Summary length fed to the hidden layer: per-feature mean over the
/// window followed by the newest timestep.
pub const SUMMARY_LEN: usize = 2 * FEATURE_COUNT;

/// Sequence classifier that pools the window into a fixed-size summary and
/// runs it through `tanh` hidden and softmax output layers.
///
/// When `input_timesteps` is set the model only accepts windows of exactly
/// that many steps.
#[derive(Debug, Clone)]
pub struct PooledDenseClassifier {
    name: String,
    version: String,
    input_timesteps: Option<usize>,
    hidden: DenseLayer,
    output: DenseLayer,
}

impl PooledDenseClassifier {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        input_timesteps: Option<usize>,
        hidden: DenseLayer,
        output: DenseLayer,
    ) -> Result<Self, String> {
        hidden.check("hidden", SUMMARY_LEN)?;
        output.check("output", hidden.units())?;
        if output.units() != RISK_CLASSES {
            return Err(format!(
                "output layer has {} units, expected {}",
                output.units(),
                RISK_CLASSES
            ));
        }
        if input_timesteps == Some(0) {
            return Err("input_timesteps must be at least 1".to_string());
        }

        Ok(Self {
            name: name.into(),
            version: version.into(),
            input_timesteps,
            hidden,
            output,
        })
    }

    /// Loads a `pooled_dense` artifact. `name` labels the model in logs and
    /// errors (e.g. `"flood_24h"`).
    pub fn load(name: &str, path: &Path) -> Result<Self, ArtifactLoadError> {
        let artifact: ClassifierArtifact = read_artifact(path)?;
        let invalid = |reason: String| ArtifactLoadError::Invalid {
            path: path.to_path_buf(),
            reason,
        };

        if artifact.kind != "pooled_dense" {
            return Err(invalid(format!("unsupported classifier kind '{}'", artifact.kind)));
        }

        let model = Self::new(
            name,
            artifact.version,
            artifact.input_timesteps,
            artifact.hidden,
            artifact.output,
        )
        .map_err(invalid)?;

        info!(
            model = %model.name,
            path = %path.display(),
            version = %model.version,
            hidden_units = model.hidden.units(),
            input_timesteps = ?model.input_timesteps,
            "Loaded classifier"
        );
        Ok(model)
    }

    pub fn input_timesteps(&self) -> Option<usize> {
        self.input_timesteps
    }

    fn summarize(steps: &[[f64; FEATURE_COUNT]]) -> [f64; SUMMARY_LEN] {
        let mut summary = [0.0; SUMMARY_LEN];
        let n = steps.len() as f64;
        for step in steps {
            for (acc, x) in summary[..FEATURE_COUNT].iter_mut().zip(step) {
                *acc += x / n;
            }
        }
        if let Some(last) = steps.last() {
            summary[FEATURE_COUNT..].copy_from_slice(last);
        }
        summary
    }
}

/// Numerically stable softmax.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

impl Classifier for PooledDenseClassifier {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f64>, InferenceError> {
        let steps = input.timesteps();
        if steps.is_empty() {
            return Err(InferenceError::EmptyWindow);
        }
        if let Some(expected) = self.input_timesteps {
            if steps.len() != expected {
                return Err(InferenceError::ShapeMismatch {
                    model: self.name.clone(),
                    expected,
                    actual: steps.len(),
                });
            }
        }

        let summary = Self::summarize(steps);
        let hidden: Vec<f64> = self.hidden.forward(&summary).into_iter().map(f64::tanh).collect();
        let probabilities = softmax(&self.output.forward(&hidden));

        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(InferenceError::Runtime {
                model: self.name.clone(),
                message: "non-finite activation".to_string(),
            });
        }
        Ok(probabilities)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn layer(units: usize, inputs: usize, value: f64) -> DenseLayer {
        DenseLayer {
            weights: vec![vec![value; inputs]; units],
            bias: vec![0.0; units],
        }
    }

    fn tensor(steps: usize, value: f64) -> InputTensor {
        InputTensor::new(vec![[value; FEATURE_COUNT]; steps])
    }

    /// Hidden unit 0 tracks rain (mean and newest); output favors the
    /// high class as that unit saturates.
    fn rain_model(input_timesteps: Option<usize>) -> PooledDenseClassifier {
        let mut hidden_row = vec![0.0; SUMMARY_LEN];
        hidden_row[2] = 1.0;
        hidden_row[FEATURE_COUNT + 2] = 1.0;
        let hidden = DenseLayer {
            weights: vec![hidden_row],
            bias: vec![0.0],
        };
        let output = DenseLayer {
            weights: vec![vec![-4.0], vec![0.0], vec![4.0]],
            bias: vec![0.0, 0.5, 0.0],
        };
        PooledDenseClassifier::new("rain", "test", input_timesteps, hidden, output).unwrap()
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let p = softmax(&[1.0, 2.0, 3.0]);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p[2] > p[1] && p[1] > p[0]);
    }

    #[test]
    fn test_softmax_handles_large_logits() {
        let p = softmax(&[1000.0, 1000.0, -1000.0]);
        assert!((p[0] - 0.5).abs() < 1e-12);
        assert!(p.iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_heavy_rain_scores_high() {
        let model = rain_model(None);
        let wet = model.predict(&tensor(30, 3.0)).unwrap();
        let dry = model.predict(&tensor(30, -3.0)).unwrap();

        assert_eq!(wet.len(), RISK_CLASSES);
        assert!(wet[2] > wet[0], "{:?}", wet);
        assert!(dry[0] > dry[2], "{:?}", dry);
    }

    #[test]
    fn test_any_length_accepted_without_fixed_timesteps() {
        let model = rain_model(None);
        for steps in [1, 11, 30, 45] {
            let p = model.predict(&tensor(steps, 0.2)).unwrap();
            assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_fixed_timesteps_reject_other_lengths() {
        let model = rain_model(Some(30));
        assert!(model.predict(&tensor(30, 0.0)).is_ok());
        let err = model.predict(&tensor(11, 0.0)).unwrap_err();
        assert_eq!(
            err,
            InferenceError::ShapeMismatch {
                model: "rain".to_string(),
                expected: 30,
                actual: 11
            }
        );
    }

    #[test]
    fn test_empty_window_rejected() {
        let model = rain_model(None);
        assert_eq!(model.predict(&tensor(0, 0.0)).unwrap_err(), InferenceError::EmptyWindow);
    }

    #[test]
    fn test_output_layer_must_have_three_classes() {
        let hidden = layer(4, SUMMARY_LEN, 0.1);
        let err = PooledDenseClassifier::new("m", "v", None, hidden, layer(2, 4, 0.1)).unwrap_err();
        assert!(err.contains("expected 3"), "{}", err);
    }

    #[test]
    fn test_hidden_layer_must_take_summary() {
        let err = PooledDenseClassifier::new("m", "v", None, layer(4, 5, 0.1), layer(3, 4, 0.1))
            .unwrap_err();
        assert!(err.contains("expected 10"), "{}", err);
    }

    #[test]
    fn test_load_artifact() {
        let artifact = serde_json::json!({
            "version": "2024.05-24h",
            "kind": "pooled_dense",
            "input_timesteps": 30,
            "hidden": { "weights": vec![vec![0.1; SUMMARY_LEN]; 4], "bias": [0.0, 0.1, -0.1, 0.0] },
            "output": { "weights": vec![vec![0.2; 4]; 3], "bias": [0.3, 0.0, -0.3] }
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", artifact).unwrap();

        let model = PooledDenseClassifier::load("flood_24h", file.path()).unwrap();
        assert_eq!(model.name(), "flood_24h");
        assert_eq!(model.version(), "2024.05-24h");
        assert_eq!(model.input_timesteps(), Some(30));
    }

    #[test]
    fn test_load_rejects_unknown_kind() {
        let artifact = serde_json::json!({
            "version": "v",
            "kind": "keras_lstm",
            "hidden": { "weights": [], "bias": [] },
            "output": { "weights": [], "bias": [] }
        });
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{}", artifact).unwrap();
        let err = PooledDenseClassifier::load("m", file.path()).unwrap_err();
        assert!(err.to_string().contains("keras_lstm"));
    }
}
