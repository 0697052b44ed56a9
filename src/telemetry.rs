//! Injectable logging handle.
//!
//! Library code never installs a process-wide subscriber. Components receive
//! a `Telemetry` and run their work inside `Telemetry::scope`, which makes
//! the wrapped dispatch the default for the current thread for the duration
//! of the call.

use tracing::Dispatch;
use tracing::dispatcher;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

#[derive(Clone)]
pub struct Telemetry {
    dispatch: Dispatch,
}

impl Telemetry {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// Builds a fmt subscriber from config. `RUST_LOG` wins over
    /// `logging.filter` when set.
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self::new(build_dispatch(config))
    }

    /// Discards every event.
    pub fn silent() -> Self {
        Self::new(Dispatch::none())
    }

    /// Whatever dispatch is current on this thread.
    pub fn current() -> Self {
        Self::new(dispatcher::get_default(|d| d.clone()))
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Runs `f` with this telemetry as the thread's default dispatch.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry").finish_non_exhaustive()
    }
}

/// Constructs the service subscriber without installing it.
pub fn build_dispatch(config: &LoggingConfig) -> Dispatch {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.filter));

    if config.json {
        Dispatch::new(
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .finish(),
        )
    } else {
        Dispatch::new(
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .finish(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_returns_closure_value() {
        let telemetry = Telemetry::silent();
        let value = telemetry.scope(|| {
            tracing::info!("swallowed");
            42
        });
        assert_eq!(value, 42);
    }

    #[test]
    fn test_scope_sets_default_dispatch() {
        let telemetry = Telemetry::from_config(&LoggingConfig::default());
        let inner = telemetry.scope(Telemetry::current);
        assert!(!inner.dispatch().is::<tracing::subscriber::NoSubscriber>());

        let silent = Telemetry::silent().scope(Telemetry::current);
        assert!(silent.dispatch().is::<tracing::subscriber::NoSubscriber>());
    }
}
