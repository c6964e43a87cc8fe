use std::sync::Arc;

use async_trait::async_trait;
use block_core::this_month;

use crate::{pool::PgPool, require_first_of_month, UserDatabase};

pub struct PostgresUserDatabase {
    pool: Arc<PgPool>,
}

impl PostgresUserDatabase {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDatabase for PostgresUserDatabase {
    async fn assert_user(&self, user_id: i64) -> anyhow::Result<()> {
        let conn = self.pool.acquire().await?;
        conn.execute(
            "INSERT INTO users (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            &[&user_id],
        )
        .await?;
        Ok(())
    }

    async fn create_prefix(&self, user_id: i64) -> anyhow::Result<String> {
        self.assert_user(user_id).await?;
        let name = uuid::Uuid::new_v4();
        let conn = self.pool.acquire().await?;
        conn.execute("INSERT INTO prefixes (name, user_id) VALUES ($1, $2)", &[&name, &user_id]).await?;
        Ok(name.to_string())
    }

    async fn has_prefix(&self, user_id: i64, name: &str) -> anyhow::Result<bool> {
        let name: uuid::Uuid = name.parse()?;
        let conn = self.pool.acquire().await?;
        let row = conn
            .query_opt("SELECT 1 FROM prefixes WHERE name = $1 AND user_id = $2", &[&name, &user_id])
            .await?;
        Ok(row.is_some())
    }

    async fn get_prefix_owner(&self, name: &str) -> anyhow::Result<Option<i64>> {
        let Ok(name) = name.parse::<uuid::Uuid>() else { return Ok(None) };
        let conn = self.pool.acquire().await?;
        let row = conn.query_opt("SELECT user_id FROM prefixes WHERE name = $1", &[&name]).await?;
        Ok(row.map(|r| r.get(0)))
    }

    async fn get_prefixes(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        let conn = self.pool.acquire().await?;
        let rows = conn.query("SELECT name FROM prefixes WHERE user_id = $1", &[&user_id]).await?;
        Ok(rows.into_iter().map(|r| r.get::<_, uuid::Uuid>(0).to_string()).collect())
    }

    async fn get_size(&self, user_id: i64) -> anyhow::Result<i64> {
        self.assert_user(user_id).await?;
        let conn = self.pool.acquire().await?;
        let row = conn.query_one("SELECT size FROM users WHERE user_id = $1", &[&user_id]).await?;
        Ok(row.get(0))
    }

    async fn update_size(&self, prefix: &str, delta: i64) -> anyhow::Result<()> {
        let prefix: uuid::Uuid = prefix.parse()?;
        let conn = self.pool.acquire().await?;
        let updated = conn
            .execute(
                "UPDATE users SET size = size + $1 WHERE user_id = (SELECT user_id FROM prefixes WHERE name = $2)",
                &[&delta, &prefix],
            )
            .await?;
        anyhow::ensure!(updated == 1, "update_size: unknown prefix {prefix}");
        Ok(())
    }

    async fn get_traffic(&self, user_id: i64) -> anyhow::Result<i64> {
        let conn = self.pool.acquire().await?;
        let row = conn
            .query_opt(
                "SELECT traffic FROM traffic WHERE user_id = $1 AND traffic_month = $2",
                &[&user_id, &this_month()],
            )
            .await?;
        Ok(row.map(|r| r.get(0)).unwrap_or(0))
    }

    async fn get_traffic_by_prefix(&self, prefix: &str) -> anyhow::Result<i64> {
        match self.get_prefix_owner(prefix).await? {
            Some(owner) => self.get_traffic(owner).await,
            None => Ok(0),
        }
    }

    async fn update_traffic(&self, prefix: &str, delta: i64) -> anyhow::Result<()> {
        let month = this_month();
        require_first_of_month(month)?;
        let owner = self
            .get_prefix_owner(prefix)
            .await?
            .ok_or_else(|| anyhow::anyhow!("unknown prefix {prefix}"))?;
        let conn = self.pool.acquire().await?;
        conn.execute(
            "INSERT INTO traffic (user_id, traffic_month, traffic) VALUES ($1, $2, $3)
             ON CONFLICT (user_id, traffic_month) DO UPDATE SET traffic = traffic.traffic + EXCLUDED.traffic",
            &[&owner, &month, &delta],
        )
        .await?;
        Ok(())
    }
}
