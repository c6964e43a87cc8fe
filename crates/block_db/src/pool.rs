//! A deliberately simple bounded connection pool.
//!
//! This mirrors the original deployment's `SimpleConnectionPool(1, 20, ...)`
//! rather than reaching for an opaque pool crate: acquiring a connection
//! from an exhausted pool retries on a fixed 500ms delay in an unbounded
//! loop, and every 500ms spent waiting is added to `wait_seconds_counter`
//! (wired to the `block_wait_database_connections` metric by the caller).
//! This is back-pressure, never an error surfaced to the client.

use std::{collections::VecDeque, sync::Arc, time::Duration};

use parking_lot::Mutex;
use prometheus::Counter;
use tokio::sync::Semaphore;
use tokio_postgres::{Client, NoTls};

const RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct PgPool {
    conn_string: String,
    idle: Mutex<VecDeque<Client>>,
    permits: Arc<Semaphore>,
    wait_seconds_counter: Counter,
}

impl PgPool {
    /// Eagerly opens `min_size` connections and allows growing up to
    /// `max_size` on demand.
    pub async fn connect(
        conn_string: impl Into<String>,
        min_size: usize,
        max_size: usize,
        wait_seconds_counter: Counter,
    ) -> anyhow::Result<Self> {
        let conn_string = conn_string.into();
        let mut idle = VecDeque::with_capacity(max_size);
        for _ in 0..min_size {
            idle.push_back(Self::open(&conn_string).await?);
        }
        Ok(Self {
            conn_string,
            idle: Mutex::new(idle),
            permits: Arc::new(Semaphore::new(max_size)),
            wait_seconds_counter,
        })
    }

    async fn open(conn_string: &str) -> anyhow::Result<Client> {
        let (client, connection) = tokio_postgres::connect(conn_string, NoTls).await?;
        tokio::spawn(async move {
            if let Err(err) = connection.await {
                tracing::error!(%err, "postgres connection closed with an error");
            }
        });
        Ok(client)
    }

    pub async fn acquire(&self) -> anyhow::Result<PooledConnection<'_>> {
        let permit = loop {
            match self.permits.clone().try_acquire_owned() {
                Ok(permit) => break permit,
                Err(_) => {
                    tokio::time::sleep(RETRY_DELAY).await;
                    self.wait_seconds_counter.inc_by(RETRY_DELAY.as_secs_f64());
                },
            }
        };
        let client = match self.idle.lock().pop_front() {
            Some(client) => client,
            None => Self::open(&self.conn_string).await?,
        };
        Ok(PooledConnection { pool: self, client: Some(client), _permit: permit })
    }
}

pub struct PooledConnection<'a> {
    pool: &'a PgPool,
    client: Option<Client>,
    _permit: tokio::sync::OwnedSemaphorePermit,
}

impl std::ops::Deref for PooledConnection<'_> {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client taken only on drop")
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            if !client.is_closed() {
                self.pool.idle.lock().push_back(client);
            }
        }
    }
}
