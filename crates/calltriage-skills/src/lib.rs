//! Concrete collaborators behind the calltriage-core seams.

mod model_router;
mod ticket_backend;

pub use model_router::{LlmMode, ModelRouter};
pub use ticket_backend::{HttpTicketBackend, MockTicketBackend};

use calltriage_core::{Backends, CompletionService, CoreConfig};
use std::sync::Arc;

/// Completion service selected by `llm_mode`.
pub fn completion_from_config(config: &CoreConfig) -> Arc<dyn CompletionService> {
    Arc::new(ModelRouter::from_config(config))
}

/// HTTP backend when `ticket_backend_url` is set, otherwise the mock.
pub fn backends_from_config(config: &CoreConfig) -> Backends {
    match HttpTicketBackend::from_config(config) {
        Some(http) => Backends::from_shared(Arc::new(http)),
        None => {
            tracing::info!(target: "calltriage::backend", "no ticket backend configured; using mock backend");
            Backends::from_shared(Arc::new(MockTicketBackend::default()))
        }
    }
}
