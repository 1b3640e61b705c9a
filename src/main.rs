use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;

use arunika::application::ports::SessionStore;
use arunika::application::realtime::{ConnectionServices, Hub};
use arunika::application::saga::SagaManager;
use arunika::application::services::{
    ConversationService, SessionCleanupWorker, conversation_pipeline, log_saga_events,
};
use arunika::domain::AudioConfig;
use arunika::infrastructure::audio::AudioProviderFactory;
use arunika::infrastructure::llm::ConversationModelFactory;
use arunika::infrastructure::moderation::KeywordContentModerator;
use arunika::infrastructure::observability::{TracingConfig, init_tracing};
use arunika::infrastructure::persistence::InMemorySessionStore;
use arunika::presentation::{AppState, Environment, Settings, create_router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment).context("Failed to load configuration")?;

    let json_format = settings.logging.enable_json
        || std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let tracing_config = TracingConfig::new(environment.as_str(), json_format)
        .with_default_filter(settings.logging.level.clone());
    init_tracing(&tracing_config, settings.server.port);

    let recognizer = AudioProviderFactory::recognizer(&settings.providers)?;
    let synthesizer = AudioProviderFactory::synthesizer(&settings.providers)?;
    let conversation_model = ConversationModelFactory::create(&settings.providers)?;
    let moderator = Arc::new(KeywordContentModerator::new(
        &settings.moderation.blocked_terms,
    ));
    let session_store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());

    tracing::info!(
        provider = ?settings.providers.kind,
        blocked_terms = settings.moderation.blocked_terms.len(),
        "Providers configured"
    );

    let pipeline = &settings.pipeline;
    let saga_manager = Arc::new(SagaManager::new(pipeline.event_buffer));
    saga_manager
        .register_definition(conversation_pipeline(
            Arc::clone(&recognizer),
            moderator,
            synthesizer,
            Duration::from_secs(pipeline.timeout_secs),
        ))
        .await;
    if let Some(events) = saga_manager.take_event_receiver() {
        tokio::spawn(log_saga_events(events));
    }

    let conversation_service = Arc::new(ConversationService::new(
        Arc::clone(&saga_manager),
        Duration::from_secs(pipeline.wait_timeout_secs),
        Duration::from_millis(pipeline.poll_interval_ms),
    ));

    let (hub, hub_worker) = Hub::new(settings.websocket.hub_buffer);
    tokio::spawn(hub_worker.run());

    let session = &settings.session;
    let cleanup_worker = SessionCleanupWorker::new(
        Arc::clone(&session_store),
        Arc::clone(&saga_manager),
        Duration::from_secs(session.cleanup_interval_secs),
        Duration::from_secs(session.cleanup_initial_delay_secs),
        Duration::from_secs(session.saga_retention_secs),
    );
    tokio::spawn(cleanup_worker.run());

    let state = AppState {
        hub,
        saga_manager,
        connection_services: ConnectionServices {
            session_store,
            recognizer,
            conversation_model,
            conversation_service,
            continuation_policy: session.continuation_policy(),
            default_audio: AudioConfig::from(&settings.audio),
            store_timeout: Duration::from_secs(session.store_timeout_secs),
            recognition_close_timeout: settings.audio.recognition_close_timeout(),
        },
        websocket: settings.websocket.clone(),
    };

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("Invalid server address")?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
