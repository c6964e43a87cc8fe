use std::sync::Arc;

use async_trait::async_trait;
use block_core::User;

use crate::{AuthOutcome, AuthResolver};

/// Wraps a real resolver with a configured bypass token for local testing:
/// presenting that token short-circuits the remote lookup and returns a
/// synthetic, maximally-permissive user tagged `Bypass` so callers skip
/// prefix-ownership checks without provisioning a real account.
pub struct DevAuth {
    inner: Arc<dyn AuthResolver>,
    bypass_token: String,
    bypass_user_id: i64,
}

impl DevAuth {
    pub fn new(inner: Arc<dyn AuthResolver>, bypass_token: impl Into<String>, bypass_user_id: i64) -> Self {
        Self { inner, bypass_token: bypass_token.into(), bypass_user_id }
    }

    fn bypass_user(&self) -> User {
        User { user_id: self.bypass_user_id, is_active: true, quota: i64::MAX, traffic_quota: i64::MAX }
    }
}

#[async_trait]
impl AuthResolver for DevAuth {
    async fn auth(&self, header: &str) -> anyhow::Result<AuthOutcome> {
        if header == self.bypass_token {
            return Ok(AuthOutcome::Bypass(self.bypass_user()));
        }
        self.inner.auth(header).await
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<User> {
        if user_id == self.bypass_user_id {
            return Ok(self.bypass_user());
        }
        self.inner.get_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl AuthResolver for AlwaysFails {
        async fn auth(&self, _header: &str) -> anyhow::Result<AuthOutcome> {
            anyhow::bail!("should not be called")
        }

        async fn get_user(&self, _user_id: i64) -> anyhow::Result<User> {
            anyhow::bail!("should not be called")
        }
    }

    #[tokio::test]
    async fn bypass_token_short_circuits_remote_lookup() {
        let dev = DevAuth::new(Arc::new(AlwaysFails), "dev-token", 1);
        let outcome = dev.auth("dev-token").await.unwrap();
        assert!(outcome.is_bypass());
        assert_eq!(outcome.user().user_id, 1);
    }

    #[tokio::test]
    async fn non_bypass_token_delegates() {
        let dev = DevAuth::new(Arc::new(AlwaysFails), "dev-token", 1);
        assert!(dev.auth("real-token").await.is_err());
    }
}
