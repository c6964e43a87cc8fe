//! The gateway's prometheus registry, translated 1:1 from the original
//! deployment's monitoring module - same metric names, same shape, so
//! existing dashboards and alerts keep working unmodified.

use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
};

pub struct Metrics {
    pub registry: Registry,

    pub in_progress_requests: Gauge,
    pub response_time: Histogram,

    pub wait_for_auth: Histogram,
    pub wait_for_transfer_store: Histogram,
    pub wait_for_transfer_retrieve: Histogram,
    pub wait_for_transfer_meta: Histogram,
    pub wait_for_transfer_delete: Histogram,
    pub s3_requests: Histogram,

    pub access_denied: CounterVec,
    pub content_length_error: Counter,

    pub auth_cache_hits: Counter,
    pub auth_cache_sets: Counter,

    pub traffic_response: Counter,
    pub traffic_request: Counter,
    pub traffic_by_request: Histogram,
    pub quota_by_request: HistogramVec,

    pub wait_database_connections: Counter,

    pub websocket_connections: Gauge,
    pub websocket_connection_duration: Histogram,
    pub websocket_messages: Counter,

    pub pubsub_published: Counter,
    pub pubsub_connections: Gauge,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let in_progress_requests =
            Gauge::new("block_in_progress_requests", "Requests currently being handled")?;
        let response_time =
            Histogram::with_opts(HistogramOpts::new("block_response_time", "End-to-end request latency"))?;
        let wait_for_auth = Histogram::with_opts(HistogramOpts::new(
            "block_wait_for_auth",
            "Time spent resolving the authenticated user",
        ))?;
        let wait_for_transfer_store = Histogram::with_opts(HistogramOpts::new(
            "block_wait_for_transfer_store",
            "Time spent in the object store's store() call",
        ))?;
        let wait_for_transfer_retrieve = Histogram::with_opts(HistogramOpts::new(
            "block_wait_for_transfer_retrieve",
            "Time spent in the object store's retrieve() call",
        ))?;
        let wait_for_transfer_meta = Histogram::with_opts(HistogramOpts::new(
            "block_wait_for_transfer_meta",
            "Time spent in the object store's meta() call",
        ))?;
        let wait_for_transfer_delete = Histogram::with_opts(HistogramOpts::new(
            "block_wait_for_transfer_delete",
            "Time spent in the object store's delete() call",
        ))?;
        let s3_requests =
            Histogram::with_opts(HistogramOpts::new("block_s3_requests", "Object store request latency"))?;

        let access_denied = CounterVec::new(
            Opts::new("block_access_denied", "Requests rejected, by reason"),
            &["reason"],
        )?;
        let content_length_error =
            Counter::new("content_length_error", "Uploads rejected for exceeding the body cap")?;

        let auth_cache_hits = Counter::new("block_auth_cache_hits", "Auth cache hits")?;
        let auth_cache_sets = Counter::new("block_auth_cache_sets", "Auth cache writes")?;

        let traffic_response = Counter::new("block_traffic_response", "Bytes served to clients")?;
        let traffic_request = Counter::new("block_traffic_request", "Bytes accepted from clients")?;
        let traffic_by_request = Histogram::with_opts(HistogramOpts::new(
            "block_traffic_by_request",
            "Per-request transfer size",
        ))?;
        let quota_by_request = HistogramVec::new(
            HistogramOpts::new("block_quota_by_request", "Quota usage observed per request"),
            &["type"],
        )?;

        let wait_database_connections =
            Counter::new("block_wait_database_connections", "Seconds spent waiting for a pool slot")?;

        let websocket_connections = Gauge::new("websocket_connections", "Open WebSocket connections")?;
        let websocket_connection_duration = Histogram::with_opts(HistogramOpts::new(
            "websocket_connection_duration",
            "WebSocket connection lifetime",
        ))?;
        let websocket_messages = Counter::new("websocket_messages", "WebSocket messages sent")?;

        let pubsub_published = Counter::new("pubsub_published", "Messages published to the bus")?;
        let pubsub_connections = Gauge::new("pubsub_connections", "Open pub/sub subscriber connections")?;

        for collector in [
            Box::new(in_progress_requests.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(response_time.clone()),
            Box::new(wait_for_auth.clone()),
            Box::new(wait_for_transfer_store.clone()),
            Box::new(wait_for_transfer_retrieve.clone()),
            Box::new(wait_for_transfer_meta.clone()),
            Box::new(wait_for_transfer_delete.clone()),
            Box::new(s3_requests.clone()),
            Box::new(access_denied.clone()),
            Box::new(content_length_error.clone()),
            Box::new(auth_cache_hits.clone()),
            Box::new(auth_cache_sets.clone()),
            Box::new(traffic_response.clone()),
            Box::new(traffic_request.clone()),
            Box::new(traffic_by_request.clone()),
            Box::new(quota_by_request.clone()),
            Box::new(wait_database_connections.clone()),
            Box::new(websocket_connections.clone()),
            Box::new(websocket_connection_duration.clone()),
            Box::new(websocket_messages.clone()),
            Box::new(pubsub_published.clone()),
            Box::new(pubsub_connections.clone()),
        ] {
            registry.register(collector)?;
        }

        Ok(Self {
            registry,
            in_progress_requests,
            response_time,
            wait_for_auth,
            wait_for_transfer_store,
            wait_for_transfer_retrieve,
            wait_for_transfer_meta,
            wait_for_transfer_delete,
            s3_requests,
            access_denied,
            content_length_error,
            auth_cache_hits,
            auth_cache_sets,
            traffic_response,
            traffic_request,
            traffic_by_request,
            quota_by_request,
            wait_database_connections,
            websocket_connections,
            websocket_connection_duration,
            websocket_messages,
            pubsub_published,
            pubsub_connections,
        })
    }

    pub fn encode(&self) -> anyhow::Result<String> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buf = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
