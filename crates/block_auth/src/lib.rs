//! Resolves an opaque auth header (or a user id) into a [`User`], through a
//! short-TTL cache backed by the remote user-info service.

pub mod dev;
pub mod remote;

use async_trait::async_trait;
use block_core::User;

/// Either a normally-authenticated user, or one admitted through the dev
/// bypass token. Callers that enforce prefix ownership should skip that
/// check for `Bypass` - see [`dev::DevAuth`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    User(User),
    Bypass(User),
}

impl AuthOutcome {
    pub fn user(&self) -> &User {
        match self {
            AuthOutcome::User(u) | AuthOutcome::Bypass(u) => u,
        }
    }

    pub fn is_bypass(&self) -> bool {
        matches!(self, AuthOutcome::Bypass(_))
    }
}

#[async_trait]
pub trait AuthResolver: Send + Sync {
    async fn auth(&self, header: &str) -> anyhow::Result<AuthOutcome>;

    async fn get_user(&self, user_id: i64) -> anyhow::Result<User>;
}
