use std::sync::Arc;

use block_auth::AuthResolver;
use block_db::UserDatabase;
use block_pubsub::PubSub;
use block_store::caching::CachingStore;
use tokio::sync::{broadcast, Semaphore};

use crate::metrics::Metrics;

/// Everything a handler needs, shared behind one `Arc` so `axum::State`
/// cloning is a refcount bump - one shared application object threaded
/// through the router.
pub struct AppStateInner {
    pub store: CachingStore,
    pub db: Arc<dyn UserDatabase>,
    pub auth: Arc<dyn AuthResolver>,
    pub pubsub: Arc<dyn PubSub>,
    pub metrics: Arc<Metrics>,
    /// Gates blocking object-store calls, mirroring
    /// `ThreadPoolExecutor(options.transfers)` in the original.
    pub worker_pool: Arc<Semaphore>,
    pub max_body_size: i64,
    pub shutdown: broadcast::Sender<()>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown.subscribe()
    }
}
