//! Service startup and lifetime.
//!
//! `Daemon::initialize` runs the startup sequence:
//! 1. Builds the logging handle from config
//! 2. Loads the scaler and both classifiers (any failure is fatal)
//! 3. Opens the reading/prediction store (PostgreSQL or in-memory)
//! 4. Wires everything into a `FloodPipeline`
//!
//! `Daemon::run` then serves the HTTP API until the process exits.

use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::ServiceConfig;
use crate::endpoint;
use crate::inference::orchestrator::ModelBundle;
use crate::pipeline::FloodPipeline;
use crate::store::{MemoryStore, PgStoreProvider, StoreProvider};
use crate::telemetry::Telemetry;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Where readings and predictions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// `flopred` schema in the database named by DATABASE_URL.
    Postgres,
    /// Process-local store; contents are lost on exit.
    Memory,
}

// ---------------------------------------------------------------------------
// Daemon State
// ---------------------------------------------------------------------------

pub struct Daemon {
    config: ServiceConfig,
    backend: StoreBackend,
    telemetry: Telemetry,
    clock: Arc<dyn Clock>,
    pipeline: Option<Arc<FloodPipeline>>,
}

impl Daemon {
    /// Create a daemon whose logging follows `config.logging`.
    pub fn new(config: ServiceConfig, backend: StoreBackend) -> Self {
        let telemetry = Telemetry::from_config(&config.logging);
        Self::with_telemetry(config, backend, telemetry)
    }

    pub fn with_telemetry(
        config: ServiceConfig,
        backend: StoreBackend,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            config,
            backend,
            telemetry,
            clock: Arc::new(SystemClock),
            pipeline: None,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// The pipeline, once `initialize` has succeeded.
    pub fn pipeline(&self) -> Option<&Arc<FloodPipeline>> {
        self.pipeline.as_ref()
    }

    /// Load artifacts and open the store.
    pub fn initialize(&mut self) -> Result<(), Box<dyn Error>> {
        let telemetry = self.telemetry.clone();
        telemetry.scope(|| self.initialize_inner())
    }

    fn initialize_inner(&mut self) -> Result<(), Box<dyn Error>> {
        let bundle = ModelBundle::load(&self.config.artifacts).inspect_err(|e| {
            error!(error = %e, "Failed to load models; refusing to start");
        })?;
        info!(
            scaler = bundle.scaler.version(),
            classifier_24h = bundle.classifier_24.version(),
            classifier_48h = bundle.classifier_48.version(),
            "Model bundle ready"
        );

        let store: Arc<dyn StoreProvider> = match self.backend {
            StoreBackend::Postgres => {
                let provider = PgStoreProvider::from_env()?;
                info!("Connected to PostgreSQL store");
                Arc::new(provider)
            }
            StoreBackend::Memory => {
                warn!("Using in-memory store; data is lost on exit");
                Arc::new(MemoryStore::new())
            }
        };

        let pipeline = FloodPipeline::new(
            Arc::new(bundle),
            store,
            Arc::clone(&self.clock),
            self.config.pipeline.clone(),
            self.telemetry.clone(),
        );
        info!(
            window_length = pipeline.config().window_length,
            short_window_policy = ?pipeline.config().short_window_policy,
            duplicate_timestamp_policy = ?pipeline.config().duplicate_timestamp_policy,
            "Pipeline initialized"
        );

        self.pipeline = Some(Arc::new(pipeline));
        Ok(())
    }

    /// Serve the HTTP API (blocks).
    pub fn run(&self) -> Result<(), Box<dyn Error>> {
        let pipeline = self.pipeline.as_ref().ok_or("Daemon not initialized")?;
        endpoint::start_endpoint_server(Arc::clone(pipeline), self.config.endpoint.clone())?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
