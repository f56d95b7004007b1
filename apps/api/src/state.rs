use std::sync::Arc;

use crate::config::Config;
use crate::identity::IdentityPolicy;
use crate::llm_client::TextGenerator;
use crate::store::sessions::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionRegistry>,
    pub policy: Arc<dyn IdentityPolicy>,
    /// `None` when no Gemini key is configured; rewrite requests then fail.
    pub llm: Option<Arc<dyn TextGenerator>>,
    pub config: Config,
}
