use std::sync::Arc;

use chat_service::config::Config;
use chat_service::error::{AppError, AppResult};
use chat_service::logging::init_tracing;
use chat_service::pubsub::{start_redis_listener, ChannelRegistry};
use chat_service::routes::build_router;
use chat_service::services::profile_client::ProfileClient;
use chat_service::services::push::{PushClient, WebhookPush};
use chat_service::state::AppState;
use chat_service::store::{ChatStore, MemoryStore, PgStore};

#[tokio::main]
async fn main() -> AppResult<()> {
    init_tracing();
    let config = Config::from_env()?;

    let store: Arc<dyn ChatStore> = match config.database_url.as_deref() {
        Some(url) => {
            let pg = PgStore::connect(url).await?;
            pg.run_migrations().await?;
            tracing::info!("connected to postgres");
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let channels = match config.redis_url.as_deref() {
        Some(url) => {
            let client = redis::Client::open(url)
                .map_err(|e| AppError::Config(format!("invalid REDIS_URL: {e}")))?;
            let registry = ChannelRegistry::with_redis(client.clone());
            tokio::spawn(start_redis_listener(client, registry.clone()));
            tracing::info!("redis event mirror enabled");
            registry
        }
        None => ChannelRegistry::new(),
    };

    let push: Option<Arc<dyn PushClient>> = config
        .push
        .as_ref()
        .map(|p| Arc::new(WebhookPush::new(p.endpoint.clone())) as Arc<dyn PushClient>);
    let profiles = config
        .profile
        .as_ref()
        .map(|p| Arc::new(ProfileClient::new(p.base_url.clone())));

    let port = config.port;
    let state = AppState::new(store, channels, push, profiles, config);
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::StartServer(format!("failed to bind {addr}: {e}")))?;
    tracing::info!(%addr, "chat service listening");
    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::StartServer(e.to_string()))
}
