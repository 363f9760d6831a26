use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct PushConfig {
    pub endpoint: String,
}

#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// When unset the service runs on the in-memory store (dev / tests).
    pub database_url: Option<String>,
    /// When set, published events are mirrored over Redis pub/sub so other
    /// instances can fan them out to their local subscribers.
    pub redis_url: Option<String>,
    pub port: u16,
    /// Highest match level a deployment supports (levels are 1..=max_level).
    pub max_level: i32,
    /// A Ringing call with no answer inside this window goes to Missed.
    pub ring_timeout: Duration,
    /// Typing indicators older than this are reported as not-typing.
    pub typing_ttl: Duration,
    pub push: Option<PushConfig>,
    pub profile: Option<ProfileConfig>,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let redis_url = env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty());
        let port = env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let max_level: i32 = env::var("MAX_MATCH_LEVEL")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(4);
        if max_level < 1 {
            return Err(AppError::Config("MAX_MATCH_LEVEL must be >= 1".into()));
        }

        let ring_timeout = Duration::from_secs(
            env::var("RING_TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(45),
        );
        let typing_ttl = Duration::from_secs(
            env::var("TYPING_TTL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        );

        let push = match env::var("PUSH_ENDPOINT") {
            Ok(endpoint) if !endpoint.trim().is_empty() => Some(PushConfig { endpoint }),
            _ => None,
        };
        let profile = match env::var("PROFILE_SERVICE_URL") {
            Ok(base_url) if !base_url.trim().is_empty() => Some(ProfileConfig { base_url }),
            _ => None,
        };

        Ok(Self {
            database_url,
            redis_url,
            port,
            max_level,
            ring_timeout,
            typing_ttl,
            push,
            profile,
        })
    }

    /// Defaults for tests: in-memory store, short timers, no external collaborators.
    pub fn test_defaults() -> Self {
        Self {
            database_url: None,
            redis_url: None,
            port: 3000,
            max_level: 4,
            ring_timeout: Duration::from_millis(50),
            typing_ttl: Duration::from_secs(10),
            push: None,
            profile: None,
        }
    }
}
