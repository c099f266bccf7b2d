//! orreryd - the orrery API server.
//!
//! Opens the `RocksDB` store, binds the model state and serves the agent
//! facades over HTTP. All settings come from environment variables; see
//! [`ServerConfig::from_env`].

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use orrery_apiserver::{create_router, ServerConfig, ServerState, TokenRegistry};
use orrery_state::{LeaseLeadershipChecker, RunnerConfig, State, StateConfig};
use orrery_store::RocksStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,orrery=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting orreryd");

    let config = ServerConfig::from_env()?;
    let tokens = TokenRegistry::parse(&config.agent_tokens)?;
    let model_uuid = config.model_uuid.unwrap_or_else(|| {
        let generated = uuid::Uuid::new_v4();
        tracing::warn!(model = %generated, "No MODEL_UUID set - generated one");
        generated
    });

    tracing::info!(
        listen_addr = %config.listen_addr,
        data_dir = %config.data_dir,
        model = %model_uuid,
        max_txn_retries = config.max_txn_retries,
        agent_tokens = tokens.len(),
        "Server configuration loaded"
    );

    if tokens.is_empty() {
        tracing::warn!("No AGENT_TOKENS set - every facade call will be rejected");
    }

    // Initialize RocksDB store
    tracing::info!(path = %config.data_dir, "Opening RocksDB store");
    let store = Arc::new(RocksStore::open(&config.data_dir)?);

    let state_config = StateConfig {
        runner: RunnerConfig {
            max_retries: config.max_txn_retries,
            timeout_ms: Some(config.request_timeout_seconds.saturating_mul(1000)),
        },
    };
    let state = Arc::new(State::new(store, model_uuid, state_config));

    let listen_addr = config.listen_addr.clone();
    let server = ServerState::new(state, Arc::new(LeaseLeadershipChecker), tokens, config);
    let app = create_router(server);

    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
