use std::sync::Arc;

use async_trait::async_trait;
use block_cache::MetadataCache;
use block_core::{GatewayError, User};
use serde::{Deserialize, Serialize};

use crate::{AuthOutcome, AuthResolver};

/// Auth-service wire shape. Field names match the original accounting
/// service's response, not our internal `User` naming.
#[derive(Deserialize)]
struct AuthResponse {
    user_id: i64,
    active: bool,
    block_quota: i64,
    monthly_traffic_quota: i64,
}

impl From<AuthResponse> for User {
    fn from(r: AuthResponse) -> Self {
        User { user_id: r.user_id, is_active: r.active, quota: r.block_quota, traffic_quota: r.monthly_traffic_quota }
    }
}

#[derive(Serialize)]
struct AuthByHeader<'a> {
    auth: &'a str,
}

#[derive(Serialize)]
struct AuthByUserId {
    user_id: i64,
}

/// Talks to the remote user-info service, write-through caching every
/// successful lookup for 60s. A thin wrapper around a single
/// `reqwest::Client`, no retry logic of its own (the worker pool above it
/// owns back-pressure).
pub struct RemoteAuth {
    client: reqwest::Client,
    auth_host: String,
    api_secret: String,
    cache: Arc<dyn MetadataCache>,
}

impl RemoteAuth {
    pub fn new(auth_host: impl Into<String>, api_secret: impl Into<String>, cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            client: reqwest::Client::new(),
            auth_host: auth_host.into(),
            api_secret: api_secret.into(),
            cache,
        }
    }

    async fn post(&self, body: impl Serialize) -> anyhow::Result<User> {
        let response = self
            .client
            .post(&self.auth_host)
            .header("APISECRET", &self.api_secret)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::AuthUpstream(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!(GatewayError::Unauthorized("user not found".into()));
        }
        if !response.status().is_success() {
            anyhow::bail!(GatewayError::AuthUpstream(format!("status {}", response.status())));
        }
        let parsed: AuthResponse =
            response.json().await.map_err(|e| GatewayError::AuthUpstream(e.to_string()))?;
        Ok(parsed.into())
    }
}

#[async_trait]
impl AuthResolver for RemoteAuth {
    async fn auth(&self, header: &str) -> anyhow::Result<AuthOutcome> {
        if let Some(user) = self.cache.get_auth(header).await? {
            return Ok(AuthOutcome::User(user));
        }
        let user = self.post(AuthByHeader { auth: header }).await?;
        self.cache.set_auth(header, &user).await?;
        Ok(AuthOutcome::User(user))
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<User> {
        if let Some(user) = self.cache.get_user(user_id).await? {
            return Ok(user);
        }
        let user = self.post(AuthByUserId { user_id }).await?;
        // write-through under both key forms, same as `auth()`
        self.cache.set_auth(&user_id.to_string(), &user).await?;
        Ok(user)
    }
}
