use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::Coordinator;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(config: Arc<Config>, coordinator: Arc<Coordinator>) -> Self {
        Self {
            config,
            coordinator,
        }
    }
}
