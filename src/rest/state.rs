//! API state management for the REST server.

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::ExecutionGateway;
use crate::registry::StepRegistry;
use crate::session::SessionMachine;

/// Shared state for the REST API
#[derive(Clone)]
pub struct ApiState {
    pub machine: SessionMachine,
    /// Name of the configured model, reported by `/status`
    pub model: Arc<str>,
}

impl ApiState {
    pub fn new(machine: SessionMachine, config: &Config) -> Self {
        Self {
            machine,
            model: Arc::from(config.llm.model.as_str()),
        }
    }

    pub fn registry(&self) -> &StepRegistry {
        self.machine.strategy().registry()
    }

    pub fn gateway(&self) -> &ExecutionGateway {
        self.machine.gateway()
    }
}
