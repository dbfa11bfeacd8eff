//! callturn - conversational voice-call bot
//!
//! Answers telephony webhooks and media streams, keeps a short dialogue per
//! call, and replies through a chat-completion model.

mod api;
mod config;
mod inbound;
mod instruction;
mod llm;
mod reply;
mod runtime;
mod session;
mod state_machine;

use api::{create_router, AppState};
use config::Config;
use llm::create_service;
use runtime::{LlmClient, ServiceLlmClient, TurnController, UnconfiguredLlmClient};
use session::{spawn_sweeper, InMemorySessionStore, SessionStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal in production
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "callturn=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env();

    // Completion provider; without one every call gets the apology
    let llm: Arc<dyn LlmClient> = match create_service(&config.llm) {
        Ok(service) => {
            tracing::info!(model = %service.model_id(), "LLM service initialized");
            Arc::new(ServiceLlmClient::new(service))
        }
        Err(e) => {
            tracing::warn!(error = %e, "No LLM configured. Set OPENAI_API_KEY or LLM_GATEWAY.");
            Arc::new(UnconfiguredLlmClient::new(e.message))
        }
    };

    let store: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let cancel = CancellationToken::new();
    let sweeper = spawn_sweeper(
        store.clone(),
        config.sweep,
        config.sweep_interval,
        cancel.clone(),
    );

    let controller = Arc::new(TurnController::new(store, llm, config.call.clone()));
    let state = AppState::new(controller, &config);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(
        %addr,
        max_turns = config.call.policy.max_turns,
        public_base_url = ?config.public_base_url,
        "callturn listening"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    cancel.cancel();
    let _ = sweeper.await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            }
            tracing::info!("Shutdown requested");
        }
        () = cancel.cancelled() => {}
    }
}
