use agrichat::api::{self, app_state::AppState};
use agrichat::catalog::{CatalogStore, create_catalog_store};
use agrichat::config::{ConfigLoader, LoggingConfig};
use agrichat::generation::{GenerateOptions, TokenGenerator, create_generator};
use agrichat::index::{MemoryVectorIndex, SemanticIndex, create_embedding_model};
use agrichat::observability::{AppMetrics, ObservabilityState, create_observability_router};
use agrichat::services::handlers::SpecialRouter;
use agrichat::services::intent::{IntentClassifier, create_intent_classifier};
use agrichat::services::resolver::create_context_resolver;
use agrichat::services::session::{SessionRegistry, spawn_idle_sweeper};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load()?;
    ConfigLoader::validate(&config)?;
    let _log_guard = init_tracing(&config.logging);

    info!("Starting Agrichat...");

    let catalog: Arc<dyn CatalogStore> =
        Arc::from(create_catalog_store(&config.retrieval.catalog_path));
    info!("Catalog store initialized");

    let embedding_model = create_embedding_model(&config.embedding)?;
    let vector_index = MemoryVectorIndex::new(embedding_model);
    if let Err(e) = vector_index.ingest_dir(&config.retrieval.docs_path).await {
        warn!(error = %e, "document ingest failed, semantic index starts empty");
    }
    info!("Semantic index initialized ({} chunks)", vector_index.len());
    let index: Arc<dyn SemanticIndex> = Arc::new(vector_index);

    let generator: Arc<dyn TokenGenerator> = Arc::from(create_generator(&config.generator)?);
    info!(
        "Token generator initialized: {} (backend: {})",
        config.generator.model_name, config.generator.backend
    );

    let classifier: Arc<dyn IntentClassifier> =
        Arc::from(create_intent_classifier(generator.clone(), &config.generator));
    let resolver =
        create_context_resolver(classifier, catalog.clone(), index, config.retrieval.clone());
    info!("Context resolver initialized");

    let registry = Arc::new(SessionRegistry::new(&config.session));
    let metrics = AppMetrics::default();
    let sweeper = spawn_idle_sweeper(
        registry.clone(),
        Duration::from_secs(config.session.sweep_interval),
        metrics.clone(),
    );
    info!("Session registry initialized");

    let org_display_name = match catalog.get_organization().await {
        Ok(Some(org)) => org.name,
        _ => None,
    }
    .or_else(|| config.retrieval.org_aliases.first().cloned())
    .unwrap_or_else(|| config.app_name.clone());

    let special_router = Arc::new(SpecialRouter::standard(catalog.clone()));

    let state = AppState::new(
        registry,
        resolver,
        generator,
        special_router,
        metrics.clone(),
        GenerateOptions::from_config(&config.generator),
        org_display_name,
        config.session.synthetic_chunk_chars,
    );

    let observability_state = Arc::new(ObservabilityState::new(
        &config.app_name,
        env!("CARGO_PKG_VERSION"),
        metrics,
    ));
    let router = create_observability_router(observability_state).merge(api::create_router(state));
    info!("API router created with observability endpoints");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    info!("Idle sweeper stopped");

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_tracing(config: &LoggingConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.clone()));

    if let Some(dir) = &config.log_dir {
        let appender = tracing_appender::rolling::daily(dir, "agrichat.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false);
        if config.structured {
            builder.json().init();
        } else {
            builder.init();
        }
        Some(guard)
    } else {
        let builder = tracing_subscriber::fmt().with_env_filter(filter);
        if config.structured {
            builder.json().init();
        } else {
            builder.init();
        }
        None
    }
}
