use std::sync::Arc;

use crate::capabilities::CapabilityTable;
use crate::config::Config;
use crate::pubsub::ChannelRegistry;
use crate::services::profile_client::ProfileClient;
use crate::services::push::PushClient;
use crate::store::{ChatStore, MemoryStore};

/// Shared application state. Everything services need is reachable from
/// here; handlers get it via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    pub channels: ChannelRegistry,
    pub push: Option<Arc<dyn PushClient>>,
    pub profiles: Option<Arc<ProfileClient>>,
    pub config: Arc<Config>,
    pub capabilities: Arc<CapabilityTable>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ChatStore>,
        channels: ChannelRegistry,
        push: Option<Arc<dyn PushClient>>,
        profiles: Option<Arc<ProfileClient>>,
        config: Config,
    ) -> Self {
        let capabilities = Arc::new(CapabilityTable::with_max_level(config.max_level));
        Self {
            store,
            channels,
            push,
            profiles,
            config: Arc::new(config),
            capabilities,
        }
    }

    /// In-memory state for tests and local development.
    pub fn in_memory(config: Config) -> Self {
        Self::new(
            Arc::new(MemoryStore::new()),
            ChannelRegistry::new(),
            None,
            None,
            config,
        )
    }
}
