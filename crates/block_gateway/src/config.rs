//! CLI flags layered over environment variables, defaults matching the
//! original `tornado.options` defaults.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "block-gateway", version, about = "Multi-tenant block storage gateway")]
pub struct Config {
    /// Address to bind the API listener to.
    #[arg(long, env = "BLOCK_ADDRESS", default_value = "0.0.0.0")]
    pub address: String,

    /// Port for the `^/api/v0/` HTTP and WebSocket surface.
    #[arg(long, env = "BLOCK_PORT", default_value_t = 6000)]
    pub port: u16,

    /// Port the prometheus text-format registry is served on. Unset
    /// disables the metrics listener entirely.
    #[arg(long, env = "BLOCK_PROMETHEUS_PORT")]
    pub prometheus_port: Option<u16>,

    /// Hard cap on a single upload body, in bytes.
    #[arg(long, env = "BLOCK_MAX_BODY_SIZE", default_value_t = 100 * 1024 * 1024)]
    pub max_body_size: i64,

    /// Size of the bounded worker pool gating blocking object-store calls.
    #[arg(long, env = "BLOCK_TRANSFERS", default_value_t = 10)]
    pub transfers: usize,

    /// Shared secret sent as `APISECRET` to the accounting host.
    #[arg(long, env = "BLOCK_APISECRET")]
    pub apisecret: Option<String>,

    /// Base URL of the remote user-info service.
    #[arg(long, env = "BLOCK_ACCOUNTING_HOST")]
    pub accounting_host: Option<String>,

    /// Skip the remote auth service entirely; every request authenticates
    /// as a single bypass user. Dev/test only.
    #[arg(long, env = "BLOCK_DUMMY_AUTH", default_value_t = false)]
    pub dummy_auth: bool,

    /// Use the in-process metadata cache instead of Redis. Dev/test only.
    #[arg(long, env = "BLOCK_DUMMY_CACHE", default_value_t = false)]
    pub dummy_cache: bool,

    /// Use the local filesystem object store instead of S3.
    #[arg(long, env = "BLOCK_DUMMY", default_value_t = false)]
    pub dummy: bool,

    /// Base directory for the local filesystem object store.
    #[arg(long, env = "BLOCK_LOCAL_STORE_DIR", default_value = "./data/blocks")]
    pub local_store_dir: String,

    /// S3 bucket name, required unless `--dummy`.
    #[arg(long, env = "BLOCK_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    #[arg(long, env = "BLOCK_REDIS_HOST", default_value = "127.0.0.1")]
    pub redis_host: String,

    #[arg(long, env = "BLOCK_REDIS_PORT", default_value_t = 6379)]
    pub redis_port: u16,

    /// Postgres connection string, required unless running entirely against
    /// the in-memory test doubles.
    #[arg(long, env = "BLOCK_PSQL_DSN")]
    pub psql_dsn: Option<String>,

    #[arg(long, env = "BLOCK_DB_POOL_MIN", default_value_t = 1)]
    pub db_pool_min: usize,

    #[arg(long, env = "BLOCK_DB_POOL_MAX", default_value_t = 20)]
    pub db_pool_max: usize,
}

impl Config {
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}", self.redis_host, self.redis_port)
    }
}
