//! Read-only lookup against the profile service, used to decorate push
//! notifications with the sender's display name. Lookup failures degrade to
//! an anonymous title rather than failing the send.

use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct ProfileResponse {
    display_name: String,
}

pub struct ProfileClient {
    base_url: String,
    client: reqwest::Client,
}

impl ProfileClient {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    pub async fn display_name(&self, user_id: Uuid) -> Option<String> {
        let url = format!("{}/api/v1/profiles/{}", self.base_url, user_id);
        match self.client.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<ProfileResponse>()
                .await
                .ok()
                .map(|p| p.display_name),
            Ok(response) => {
                tracing::debug!(%user_id, status = %response.status(), "profile lookup failed");
                None
            }
            Err(e) => {
                tracing::debug!(%user_id, error = %e, "profile service unreachable");
                None
            }
        }
    }
}
