use std::sync::Arc;

use crate::generation::{GenerateOptions, TokenGenerator};
use crate::observability::AppMetrics;
use crate::services::handlers::SpecialRouter;
use crate::services::resolver::HybridContextResolver;
use crate::services::session::SessionRegistry;

/// Application state shared by every connection task
#[derive(Clone)]
pub struct AppState {
    /// Session registry serializing per-session access
    pub registry: Arc<SessionRegistry>,
    /// Hybrid context resolver
    pub resolver: Arc<HybridContextResolver>,
    /// Token generator backend
    pub generator: Arc<dyn TokenGenerator>,
    /// Ordered non-generative short-circuits
    pub special_router: Arc<SpecialRouter>,
    /// Atomic metrics
    pub metrics: AppMetrics,
    /// Generation parameters for chat turns
    pub generate_options: GenerateOptions,
    /// Organization name used in the assistant persona
    pub org_display_name: String,
    /// Chunk size for synthetic (non-generative) replies
    pub synthetic_chunk_chars: usize,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<SessionRegistry>,
        resolver: Arc<HybridContextResolver>,
        generator: Arc<dyn TokenGenerator>,
        special_router: Arc<SpecialRouter>,
        metrics: AppMetrics,
        generate_options: GenerateOptions,
        org_display_name: String,
        synthetic_chunk_chars: usize,
    ) -> Self {
        Self {
            registry,
            resolver,
            generator,
            special_router,
            metrics,
            generate_options,
            org_display_name,
            synthetic_chunk_chars,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("registry", &"Arc<SessionRegistry>")
            .field("resolver", &"Arc<HybridContextResolver>")
            .field("generator", &"Arc<dyn TokenGenerator>")
            .field("special_router", &"Arc<SpecialRouter>")
            .field("org_display_name", &self.org_display_name)
            .field("synthetic_chunk_chars", &self.synthetic_chunk_chars)
            .finish()
    }
}
