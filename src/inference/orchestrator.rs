//! Dual-horizon inference orchestrator.
//!
//! Both classifiers receive the same normalized tensor and run in parallel
//! on a small worker pool. Results are joined under a single deadline; a
//! classifier that errors, panics or misses the deadline fails the
//! prediction step with an `InferenceError`.

use crossbeam_channel as xch;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use threadpool::ThreadPool;
use tracing::{debug, error, info, warn};

use super::classifier::{Classifier, PooledDenseClassifier};
use super::scaler::{InputTensor, ScalerModel};
use crate::config::ArtifactConfig;
use crate::error::{ArtifactLoadError, InferenceError};
use crate::model::{RISK_CLASSES, RiskLevel};
use crate::telemetry::Telemetry;

// ---------------------------------------------------------------------------
// Model bundle
// ---------------------------------------------------------------------------

/// Prediction lead time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Horizon {
    H24,
    H48,
}

impl Horizon {
    pub fn label(self) -> &'static str {
        match self {
            Horizon::H24 => "24h",
            Horizon::H48 => "48h",
        }
    }
}

/// Scaler plus both horizon classifiers. Built once at startup and shared
/// read-only by every prediction cycle.
pub struct ModelBundle {
    pub scaler: ScalerModel,
    pub classifier_24: Arc<dyn Classifier>,
    pub classifier_48: Arc<dyn Classifier>,
}

impl ModelBundle {
    pub fn new(
        scaler: ScalerModel,
        classifier_24: Arc<dyn Classifier>,
        classifier_48: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            scaler,
            classifier_24,
            classifier_48,
        }
    }

    /// Loads all three artifacts. Every path is checked before any file is
    /// parsed, so a deployment missing several files hears about the first
    /// one immediately.
    pub fn load(artifacts: &ArtifactConfig) -> Result<Self, ArtifactLoadError> {
        info!("Loading prediction models and scaler");

        let paths: [&Path; 3] = [
            &artifacts.classifier_24h,
            &artifacts.classifier_48h,
            &artifacts.scaler,
        ];
        if let Some(missing) = paths.iter().find(|p| !p.exists()) {
            error!(path = %missing.display(), "Required model artifact not found");
            return Err(ArtifactLoadError::Missing(missing.to_path_buf()));
        }

        let classifier_24 = PooledDenseClassifier::load("flood_24h", &artifacts.classifier_24h)?;
        let classifier_48 = PooledDenseClassifier::load("flood_48h", &artifacts.classifier_48h)?;
        let scaler = ScalerModel::load(&artifacts.scaler)?;

        info!("Models and scaler loaded successfully");
        Ok(Self::new(scaler, Arc::new(classifier_24), Arc::new(classifier_48)))
    }

    pub fn classifier(&self, horizon: Horizon) -> &Arc<dyn Classifier> {
        match horizon {
            Horizon::H24 => &self.classifier_24,
            Horizon::H48 => &self.classifier_48,
        }
    }
}

impl std::fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelBundle")
            .field("scaler", &self.scaler.version())
            .field("classifier_24", &self.classifier_24.name())
            .field("classifier_48", &self.classifier_48.name())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decoded output of one classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct HorizonPrediction {
    pub horizon: Horizon,
    pub risk: RiskLevel,
    pub probabilities: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DualPrediction {
    pub h24: HorizonPrediction,
    pub h48: HorizonPrediction,
}

/// Index of the largest value; the lowest index wins ties.
pub fn argmax(values: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Checks a probability vector and derives its risk level.
pub fn decode(
    model: &str,
    horizon: Horizon,
    probabilities: Vec<f64>,
    tolerance: f64,
) -> Result<HorizonPrediction, InferenceError> {
    let invalid = |reason: String| InferenceError::InvalidOutput {
        model: model.to_string(),
        reason,
    };

    if probabilities.len() != RISK_CLASSES {
        return Err(invalid(format!(
            "expected {} probabilities, got {}",
            RISK_CLASSES,
            probabilities.len()
        )));
    }
    if probabilities.iter().any(|p| !p.is_finite() || *p < 0.0) {
        return Err(invalid(format!(
            "probabilities must be finite and non-negative: {:?}",
            probabilities
        )));
    }
    let total: f64 = probabilities.iter().sum();
    if (total - 1.0).abs() > tolerance {
        return Err(invalid(format!("probabilities sum to {}, expected 1.0", total)));
    }

    let risk = argmax(&probabilities)
        .and_then(RiskLevel::from_index)
        .ok_or_else(|| invalid("no maximum probability".to_string()))?;

    Ok(HorizonPrediction {
        horizon,
        risk,
        probabilities,
    })
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct InferenceOrchestrator {
    pool: ThreadPool,
    timeout: Duration,
    tolerance: f64,
    telemetry: Telemetry,
}

impl InferenceOrchestrator {
    pub fn new(workers: usize, timeout: Duration, tolerance: f64, telemetry: Telemetry) -> Self {
        Self {
            pool: ThreadPool::with_name("classifier".to_string(), workers.max(2)),
            timeout,
            tolerance,
            telemetry,
        }
    }

    /// Classifier jobs still running on the pool.
    pub fn busy_workers(&self) -> usize {
        self.pool.active_count()
    }

    /// Runs both classifiers on `input` and decodes their outputs.
    ///
    /// A job that misses the deadline is abandoned, not cancelled: it keeps
    /// its pool worker until the classifier returns. A classifier that hangs
    /// forever therefore holds one of the `inference_workers` threads for
    /// good, and later cycles queue behind it until they time out as well.
    pub fn run(
        &self,
        bundle: &ModelBundle,
        input: InputTensor,
    ) -> Result<DualPrediction, InferenceError> {
        let input = Arc::new(input);
        let (tx, rx) = xch::bounded(2);

        for horizon in [Horizon::H24, Horizon::H48] {
            let classifier = Arc::clone(bundle.classifier(horizon));
            let input = Arc::clone(&input);
            let tx = tx.clone();
            let telemetry = self.telemetry.clone();

            self.pool.execute(move || {
                let result = telemetry.scope(|| {
                    let started = Instant::now();
                    let result = classifier.predict(&input);
                    debug!(
                        model = classifier.name(),
                        horizon = horizon.label(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        ok = result.is_ok(),
                        "classifier finished"
                    );
                    result
                });
                // Receiver gone means the deadline already passed
                let _ = tx.send((horizon, result));
            });
        }
        drop(tx);

        let deadline = Instant::now() + self.timeout;
        let mut h24 = None;
        let mut h48 = None;

        while h24.is_none() || h48.is_none() {
            let pending = if h24.is_none() { Horizon::H24 } else { Horizon::H48 };
            let model = bundle.classifier(pending).name().to_string();

            let (horizon, result) = match rx.recv_deadline(deadline) {
                Ok(message) => message,
                Err(xch::RecvTimeoutError::Timeout) => {
                    warn!(
                        model = model.as_str(),
                        horizon = pending.label(),
                        busy_workers = self.pool.active_count(),
                        "Classifier missed its deadline; job left running on the pool"
                    );
                    return Err(InferenceError::Timeout {
                        model,
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
                Err(xch::RecvTimeoutError::Disconnected) => {
                    return Err(InferenceError::Runtime {
                        model,
                        message: "classifier worker exited without a result".to_string(),
                    });
                }
            };

            let name = bundle.classifier(horizon).name();
            let decoded = decode(name, horizon, result?, self.tolerance)?;
            match horizon {
                Horizon::H24 => h24 = Some(decoded),
                Horizon::H48 => h48 = Some(decoded),
            }
        }

        match (h24, h48) {
            (Some(h24), Some(h48)) => Ok(DualPrediction { h24, h48 }),
            _ => Err(InferenceError::Runtime {
                model: "orchestrator".to_string(),
                message: "missing horizon result".to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
