use std::collections::HashMap;

use async_trait::async_trait;
use block_core::this_month;
use chrono::NaiveDate;
use parking_lot::Mutex;

use crate::{require_first_of_month, UserDatabase};

#[derive(Default)]
struct Inner {
    users: HashMap<i64, i64>,
    prefixes: HashMap<String, i64>,
    traffic: HashMap<(i64, NaiveDate), i64>,
}

/// In-process test double backed by an `Arc<Mutex<Inner>>`. `month` is
/// injectable so tests can exercise traffic rollover across a month
/// boundary without waiting for a real one.
pub struct InMemoryUserDatabase {
    inner: Mutex<Inner>,
    month: Box<dyn Fn() -> NaiveDate + Send + Sync>,
}

impl InMemoryUserDatabase {
    pub fn new() -> Self {
        Self::with_month(this_month)
    }

    pub fn with_month(month: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        Self { inner: Mutex::new(Inner::default()), month: Box::new(month) }
    }
}

impl Default for InMemoryUserDatabase {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserDatabase for InMemoryUserDatabase {
    async fn assert_user(&self, user_id: i64) -> anyhow::Result<()> {
        self.inner.lock().users.entry(user_id).or_insert(0);
        Ok(())
    }

    async fn create_prefix(&self, user_id: i64) -> anyhow::Result<String> {
        self.assert_user(user_id).await?;
        let name = uuid::Uuid::new_v4().to_string();
        self.inner.lock().prefixes.insert(name.clone(), user_id);
        Ok(name)
    }

    async fn has_prefix(&self, user_id: i64, name: &str) -> anyhow::Result<bool> {
        Ok(self.inner.lock().prefixes.get(name) == Some(&user_id))
    }

    async fn get_prefix_owner(&self, name: &str) -> anyhow::Result<Option<i64>> {
        Ok(self.inner.lock().prefixes.get(name).copied())
    }

    async fn get_prefixes(&self, user_id: i64) -> anyhow::Result<Vec<String>> {
        Ok(self
            .inner
            .lock()
            .prefixes
            .iter()
            .filter(|(_, owner)| **owner == user_id)
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn get_size(&self, user_id: i64) -> anyhow::Result<i64> {
        self.assert_user(user_id).await?;
        Ok(*self.inner.lock().users.get(&user_id).unwrap_or(&0))
    }

    async fn update_size(&self, prefix: &str, delta: i64) -> anyhow::Result<()> {
        let mut inner = self.inner.lock();
        let owner = *inner.prefixes.get(prefix).ok_or_else(|| anyhow::anyhow!("unknown prefix {prefix}"))?;
        *inner.users.entry(owner).or_insert(0) += delta;
        Ok(())
    }

    async fn get_traffic(&self, user_id: i64) -> anyhow::Result<i64> {
        let month = (self.month)();
        Ok(*self.inner.lock().traffic.get(&(user_id, month)).unwrap_or(&0))
    }

    async fn get_traffic_by_prefix(&self, prefix: &str) -> anyhow::Result<i64> {
        match self.get_prefix_owner(prefix).await? {
            Some(owner) => self.get_traffic(owner).await,
            None => Ok(0),
        }
    }

    async fn update_traffic(&self, prefix: &str, delta: i64) -> anyhow::Result<()> {
        let month = (self.month)();
        require_first_of_month(month)?;
        let mut inner = self.inner.lock();
        let owner = *inner.prefixes.get(prefix).ok_or_else(|| anyhow::anyhow!("unknown prefix {prefix}"))?;
        *inner.traffic.entry((owner, month)).or_insert(0) += delta;
        Ok(())
    }
}
