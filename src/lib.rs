pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod routes;
pub mod services;

use services::orchestrator::Orchestrator;

// Application state
pub struct AppState {
    pub orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: config::Config) -> Self {
        Self {
            orchestrator: Orchestrator::new(&config),
        }
    }
}
