//! The relational usage ledger: prefix ownership, storage size and monthly
//! traffic, all behind [`UserDatabase`].

pub mod memory;
pub mod migrate;
pub mod pool;
pub mod postgres;

use async_trait::async_trait;
use chrono::NaiveDate;

#[async_trait]
pub trait UserDatabase: Send + Sync {
    /// Insert-if-absent. A unique-violation on a concurrent insert is not an
    /// error.
    async fn assert_user(&self, user_id: i64) -> anyhow::Result<()>;

    /// `assert_user`, then insert a fresh prefix and return its UUID text.
    async fn create_prefix(&self, user_id: i64) -> anyhow::Result<String>;

    async fn has_prefix(&self, user_id: i64, name: &str) -> anyhow::Result<bool>;

    async fn get_prefix_owner(&self, name: &str) -> anyhow::Result<Option<i64>>;

    async fn get_prefixes(&self, user_id: i64) -> anyhow::Result<Vec<String>>;

    /// `assert_user` and return 0 if the row didn't exist yet.
    async fn get_size(&self, user_id: i64) -> anyhow::Result<i64>;

    /// Atomic `size += delta` for the prefix's owner.
    async fn update_size(&self, prefix: &str, delta: i64) -> anyhow::Result<()>;

    /// Sum of traffic for the current month; 0 if there's no row.
    async fn get_traffic(&self, user_id: i64) -> anyhow::Result<i64>;

    async fn get_traffic_by_prefix(&self, prefix: &str) -> anyhow::Result<i64>;

    /// UPSERT `traffic(user_id, traffic_month, traffic += delta)`.
    /// `traffic_month` must be the first of a month.
    async fn update_traffic(&self, prefix: &str, delta: i64) -> anyhow::Result<()>;
}

pub(crate) fn require_first_of_month(month: NaiveDate) -> anyhow::Result<()> {
    use chrono::Datelike;
    anyhow::ensure!(month.day() == 1, "traffic_month {month} is not the first of a month");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    #[test]
    fn rejects_non_first_of_month() {
        let mid_month = NaiveDate::from_ymd_opt(2026, 7, 15).unwrap();
        assert!(require_first_of_month(mid_month).is_err());
    }

    #[test]
    fn accepts_first_of_month() {
        let first = NaiveDate::from_ymd_opt(2026, 7, 1).unwrap();
        assert!(require_first_of_month(first).is_ok());
    }
}
