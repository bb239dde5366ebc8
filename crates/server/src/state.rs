use std::sync::Arc;

use cinepost_metadata::Cascade;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub cascade: Arc<Cascade>,
}

impl AppState {
    pub fn new(cascade: Cascade) -> Self {
        Self {
            cascade: Arc::new(cascade),
        }
    }
}
