use std::sync::Arc;

use block_auth::{dev::DevAuth, remote::RemoteAuth, AuthResolver};
use block_cache::{memory::InMemoryCache, redis_cache::RedisCache, MetadataCache};
use block_db::{memory::InMemoryUserDatabase, pool::PgPool, postgres::PostgresUserDatabase, UserDatabase};
use block_gateway::{config::Config, metrics::Metrics, router, state::AppStateInner};
use block_pubsub::{memory::InMemoryPubSub, redis_pubsub::RedisPubSub, PubSub};
use block_store::{caching::CachingStore, local::LocalFsStore, s3::RemoteObjectStore, ObjectStore};
use clap::Parser;
use tokio::sync::{broadcast, Semaphore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::parse();
    let metrics = Arc::new(Metrics::new()?);

    let cache: Arc<dyn MetadataCache> = if config.dummy_cache {
        Arc::new(InMemoryCache::new())
    } else {
        Arc::new(RedisCache::connect(&config.redis_url()).await?)
    };

    let driver: Arc<dyn ObjectStore> = if config.dummy {
        Arc::new(LocalFsStore::new(config.local_store_dir.clone()))
    } else {
        let bucket = config.s3_bucket.clone().ok_or_else(|| anyhow::anyhow!("--s3-bucket is required unless --dummy"))?;
        let client = block_store::s3::client_from_env().await?;
        Arc::new(RemoteObjectStore::new(client, bucket))
    };
    let store = CachingStore::new(driver, cache.clone());

    let db: Arc<dyn UserDatabase> = if let Some(dsn) = &config.psql_dsn {
        let pool = PgPool::connect(
            dsn.as_str(),
            config.db_pool_min,
            config.db_pool_max,
            metrics.wait_database_connections.clone(),
        )
        .await?;
        let conn = pool.acquire().await?;
        block_db::migrate::run(&conn).await?;
        drop(conn);
        Arc::new(PostgresUserDatabase::new(Arc::new(pool)))
    } else {
        Arc::new(InMemoryUserDatabase::new())
    };

    let auth: Arc<dyn AuthResolver> = if config.dummy_auth {
        Arc::new(DevAuth::new(Arc::new(NoopAuth), "dev-bypass", 1))
    } else {
        let accounting_host = config
            .accounting_host
            .clone()
            .ok_or_else(|| anyhow::anyhow!("--accounting-host is required unless --dummy-auth"))?;
        let apisecret = config.apisecret.clone().unwrap_or_default();
        let auth_url = format!("{accounting_host}/api/v0/internal/user/");
        let remote = Arc::new(RemoteAuth::new(auth_url, apisecret, cache));
        remote as Arc<dyn AuthResolver>
    };

    // Reuses `--dummy-cache`: both are "run entirely in-process" toggles,
    // there's no deployment that wants Redis for one but not the other.
    let pubsub: Arc<dyn PubSub> = if config.dummy_cache {
        Arc::new(InMemoryPubSub::default())
    } else {
        Arc::new(RedisPubSub::connect(&config.redis_url()).await?)
    };

    let (shutdown_tx, _) = broadcast::channel(1);
    let app_state = Arc::new(AppStateInner {
        store,
        db,
        auth,
        pubsub,
        metrics: metrics.clone(),
        worker_pool: Arc::new(Semaphore::new(config.transfers)),
        max_body_size: config.max_body_size,
        shutdown: shutdown_tx.clone(),
    });

    let api_router = router::build(app_state.clone());
    let api_listener = tokio::net::TcpListener::bind((config.address.as_str(), config.port)).await?;
    tracing::info!(address = %config.address, port = config.port, "listening");

    let mut api_shutdown = shutdown_tx.subscribe();
    let api_server = axum::serve(api_listener, api_router).with_graceful_shutdown(async move {
        let _ = api_shutdown.recv().await;
    });

    if let Some(prometheus_port) = config.prometheus_port {
        let metrics_router = router::metrics_router(app_state.clone());
        let metrics_listener = tokio::net::TcpListener::bind((config.address.as_str(), prometheus_port)).await?;
        tracing::info!(port = prometheus_port, "serving metrics");
        let mut metrics_shutdown = shutdown_tx.subscribe();
        let metrics_server = axum::serve(metrics_listener, metrics_router).with_graceful_shutdown(async move {
            let _ = metrics_shutdown.recv().await;
        });
        let shutdown_signal = shutdown_tx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_signal.send(());
        });
        tokio::try_join!(
            async { api_server.await.map_err(anyhow::Error::from) },
            async { metrics_server.await.map_err(anyhow::Error::from) },
        )?;
    } else {
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = shutdown_tx.send(());
        });
        api_server.await?;
    }

    Ok(())
}

/// Used only to satisfy `DevAuth`'s inner-resolver slot when
/// `--dummy-auth` is set and there is no real accounting host configured.
struct NoopAuth;

#[async_trait::async_trait]
impl AuthResolver for NoopAuth {
    async fn auth(&self, _header: &str) -> anyhow::Result<block_auth::AuthOutcome> {
        anyhow::bail!(block_core::GatewayError::Unauthorized("dummy auth has no upstream".into()))
    }

    async fn get_user(&self, _user_id: i64) -> anyhow::Result<block_core::User> {
        anyhow::bail!(block_core::GatewayError::Unauthorized("dummy auth has no upstream".into()))
    }
}
