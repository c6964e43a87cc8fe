use async_trait::async_trait;
use block_core::{storage_cache_key, user_cache_key, User};
use redis::{aio::ConnectionManager, AsyncCommands};

use crate::{MetadataCache, AUTH_CACHE_TTL_SECS};

/// Networked cache backed by Redis hashes. Storage entries live forever
/// (they're invalidated explicitly on delete); auth entries carry the
/// 60s TTL so a revoked token or quota change is picked up promptly.
pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn encode_user(user: &User) -> Vec<(&'static str, String)> {
        vec![
            ("user_id", user.user_id.to_string()),
            ("is_active", (user.is_active as u8).to_string()),
            ("quota", user.quota.to_string()),
            ("traffic_quota", user.traffic_quota.to_string()),
        ]
    }

    fn decode_user(fields: std::collections::HashMap<String, String>) -> Option<User> {
        if fields.is_empty() {
            return None;
        }
        Some(User {
            user_id: fields.get("user_id")?.parse().ok()?,
            is_active: fields.get("is_active")?.parse::<u8>().ok()? != 0,
            quota: fields.get("quota")?.parse().ok()?,
            traffic_quota: fields.get("traffic_quota")?.parse().ok()?,
        })
    }
}

#[async_trait]
impl MetadataCache for RedisCache {
    async fn get_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<Option<(String, i64)>> {
        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, String> =
            conn.hgetall(storage_cache_key(prefix, file_path)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        let etag = fields.get("etag").cloned();
        let size = fields.get("size").and_then(|s| s.parse().ok());
        Ok(etag.zip(size))
    }

    async fn set_storage(&self, prefix: &str, file_path: &str, etag: &str, size: i64) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let key = storage_cache_key(prefix, file_path);
        let _: () = conn
            .hset_multiple(&key, &[("etag", etag.to_string()), ("size", size.to_string())])
            .await?;
        Ok(())
    }

    async fn invalidate_storage(&self, prefix: &str, file_path: &str) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(storage_cache_key(prefix, file_path)).await?;
        Ok(())
    }

    async fn get_auth(&self, token: &str) -> anyhow::Result<Option<User>> {
        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, String> = conn.hgetall(token).await?;
        Ok(Self::decode_user(fields))
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<Option<User>> {
        let mut conn = self.conn.clone();
        let fields: std::collections::HashMap<String, String> =
            conn.hgetall(user_cache_key(user_id)).await?;
        Ok(Self::decode_user(fields))
    }

    async fn set_auth(&self, token: &str, user: &User) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let user_key = user_cache_key(user.user_id);
        let fields = Self::encode_user(user);
        let (): () = redis::pipe()
            .atomic()
            .hset_multiple(token, &fields)
            .expire(token, AUTH_CACHE_TTL_SECS as i64)
            .hset_multiple(&user_key, &fields)
            .expire(&user_key, AUTH_CACHE_TTL_SECS as i64)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn flush(&self) -> anyhow::Result<()> {
        let mut conn = self.conn.clone();
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }
}
