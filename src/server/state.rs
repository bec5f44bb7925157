//! Shared handler state

use crate::config::ServiceConfig;
use crate::core::batch::BatchCoordinator;
use crate::core::orchestrator::Orchestrator;
use crate::download::retry::RetryExecutor;
use crate::download::tools::Toolbox;
use crate::ratelimit::{build_rate_limiter, AdmissionGate};
use std::sync::Arc;

/// Services injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub batch: Arc<BatchCoordinator>,
    pub limiter: Arc<dyn AdmissionGate>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, limiter: Arc<dyn AdmissionGate>) -> Self {
        Self {
            batch: Arc::new(BatchCoordinator::new(orchestrator.clone())),
            orchestrator,
            limiter,
            api_key: None,
        }
    }

    pub fn with_batch(mut self, batch: BatchCoordinator) -> Self {
        self.batch = Arc::new(batch);
        self
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key.map(Arc::from);
        self
    }

    /// Assemble the production services over the tools found on this host
    pub fn from_config(config: &ServiceConfig) -> Self {
        let toolbox = Toolbox::discover();
        let orchestrator = Arc::new(Orchestrator::from_toolbox(
            config.transport.clone(),
            &toolbox,
            RetryExecutor::new(),
            config.scratch_dir.clone(),
        ));
        let batch = BatchCoordinator::new(orchestrator.clone())
            .with_concurrency(config.batch_concurrency)
            .with_max_items(config.max_batch);
        let limiter = build_rate_limiter(config.rate_backend, config.rate_limits);

        Self::new(orchestrator, limiter)
            .with_batch(batch)
            .with_api_key(config.api_key.clone())
    }

    pub fn auth_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}
