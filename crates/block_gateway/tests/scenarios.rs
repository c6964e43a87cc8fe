//! End-to-end scenarios driven against the real `axum::Router` via
//! `tower::ServiceExt::oneshot`, over in-memory fakes for every
//! collaborator (object store over a tempdir, in-memory cache/db/pubsub).
//!
//! The WebSocket endpoints aren't exercised here: `oneshot` calls the
//! router without a real hyper connection, so there is no `OnUpgrade`
//! extension for `WebSocketUpgrade` to hook into. Scenario 5's actual
//! content - that a mutation's pub/sub message matches what a subscriber
//! would relay - is covered instead by subscribing directly through
//! `PubSub::connect`, which is exactly what the WebSocket handler does
//! internally.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use block_auth::{AuthOutcome, AuthResolver};
use block_cache::memory::InMemoryCache;
use block_core::{GatewayError, User};
use block_db::{memory::InMemoryUserDatabase, UserDatabase};
use block_gateway::{metrics::Metrics, router, state::AppStateInner};
use block_pubsub::{memory::InMemoryPubSub, PubSub};
use block_store::{caching::CachingStore, local::LocalFsStore};
use http_body_util::BodyExt;
use tower::ServiceExt;

const TOKEN: &str = "test-token";
const USER_ID: i64 = 42;

struct FixedAuth {
    quota: i64,
    traffic_quota: i64,
}

#[async_trait::async_trait]
impl AuthResolver for FixedAuth {
    async fn auth(&self, header: &str) -> anyhow::Result<AuthOutcome> {
        if header == TOKEN {
            Ok(AuthOutcome::User(self.user()))
        } else {
            anyhow::bail!(GatewayError::Unauthorized("bad token".into()))
        }
    }

    async fn get_user(&self, user_id: i64) -> anyhow::Result<User> {
        if user_id == USER_ID {
            Ok(self.user())
        } else {
            anyhow::bail!(GatewayError::Unauthorized("unknown user".into()))
        }
    }
}

impl FixedAuth {
    fn user(&self) -> User {
        User { user_id: USER_ID, is_active: true, quota: self.quota, traffic_quota: self.traffic_quota }
    }
}

struct TestApp {
    router: axum::Router,
    state: Arc<AppStateInner>,
    prefix: String,
    _dir: tempfile::TempDir,
}

async fn build_app(quota: i64, traffic_quota: i64) -> TestApp {
    let db = InMemoryUserDatabase::new();
    let prefix = db.create_prefix(USER_ID).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store =
        CachingStore::new(Arc::new(LocalFsStore::new(dir.path())), Arc::new(InMemoryCache::new()));
    let state = Arc::new(AppStateInner {
        store,
        db: Arc::new(db),
        auth: Arc::new(FixedAuth { quota, traffic_quota }),
        pubsub: Arc::new(InMemoryPubSub::default()),
        metrics: Arc::new(Metrics::new().unwrap()),
        worker_pool: Arc::new(tokio::sync::Semaphore::new(10)),
        max_body_size: 1024 * 1024,
        shutdown: tokio::sync::broadcast::channel(1).0,
    });
    let router = router::build(state.clone());
    TestApp { router, state, prefix, _dir: dir }
}

fn request(method: &str, uri: String, token: Option<&str>, body: Vec<u8>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", token);
    }
    builder.body(Body::from(body)).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

#[tokio::test]
async fn upload_download_delete_round_trip() {
    let app = build_app(i64::MAX, i64::MAX).await;
    let path = format!("/api/v0/files/{}/f", app.prefix);

    let resp = app
        .router
        .clone()
        .oneshot(request("POST", path.clone(), Some(TOKEN), b"Dummy".to_vec()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let resp = app.router.clone().oneshot(request("GET", path.clone(), None, vec![])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("content-length").unwrap(), "5");
    assert_eq!(resp.headers().get("etag").unwrap().to_str().unwrap(), etag);
    assert_eq!(body_bytes(resp).await, b"Dummy");

    let resp = app.router.clone().oneshot(request("DELETE", path.clone(), Some(TOKEN), vec![])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);

    let resp = app.router.clone().oneshot(request("DELETE", path.clone(), Some(TOKEN), vec![])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT, "delete of an absent key is idempotent");

    let resp = app.router.clone().oneshot(request("GET", path, None, vec![])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quota_view_tracks_uploads_and_deletes() {
    let app = build_app(1_000_000, i64::MAX).await;
    let path = format!("/api/v0/files/{}/f", app.prefix);
    let quota_path = "/api/v0/quota/".to_string();

    let view = |resp: axum::response::Response| async move {
        let bytes = body_bytes(resp).await;
        serde_json::from_slice::<serde_json::Value>(&bytes).unwrap()
    };

    let resp = app.router.clone().oneshot(request("GET", quota_path.clone(), Some(TOKEN), vec![])).await.unwrap();
    let json = view(resp).await;
    assert_eq!(json["quota"], 1_000_000);
    assert_eq!(json["size"], 0);

    app.router.clone().oneshot(request("POST", path.clone(), Some(TOKEN), b"Dummy".to_vec())).await.unwrap();
    let resp = app.router.clone().oneshot(request("GET", quota_path.clone(), Some(TOKEN), vec![])).await.unwrap();
    assert_eq!(view(resp).await["size"], 5);

    app.router.clone().oneshot(request("DELETE", path, Some(TOKEN), vec![])).await.unwrap();
    let resp = app.router.clone().oneshot(request("GET", quota_path, Some(TOKEN), vec![])).await.unwrap();
    assert_eq!(view(resp).await["size"], 0);
}

#[tokio::test]
async fn quota_grace_window_applies_only_to_metafile_overwrites() {
    let app = build_app(0, i64::MAX).await;

    let block_path = format!("/api/v0/files/{}/block/foobar", app.prefix);
    let resp = app
        .router
        .clone()
        .oneshot(request("POST", block_path, Some(TOKEN), b"x".to_vec()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED, "blocks never get a grace window");

    // A brand new meta-file is not an overwrite, so it's denied too.
    let meta_path = format!("/api/v0/files/{}/meta", app.prefix);
    let resp = app
        .router
        .clone()
        .oneshot(request("POST", meta_path.clone(), Some(TOKEN), b"x".to_vec()))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);

    // A fresh write is denied outright at zero quota, so seed the
    // meta-file directly through the store/db to get an existing object
    // to overwrite, then exercise the grace window at its boundary.
    let tmp = tempfile::NamedTempFile::new().unwrap();
    std::fs::write(tmp.path(), b"seed").unwrap();
    let so = block_core::StorageObject::new(&app.prefix, "meta").with_local_file(tmp.path().to_path_buf());
    let (_, delta) = app.state.store.store(so).await.unwrap();
    app.state.db.update_size(&app.prefix, delta).await.unwrap();

    let small_overwrite = vec![0u8; 10];
    let resp = app
        .router
        .clone()
        .oneshot(request("POST", meta_path.clone(), Some(TOKEN), small_overwrite))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT, "small overwrite stays within the grace window");

    let big_overwrite = vec![0u8; 151 * 1024];
    let resp = app.router.clone().oneshot(request("POST", meta_path, Some(TOKEN), big_overwrite)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED, "151 KiB overwrite exceeds the grace window");
}

#[tokio::test]
async fn download_is_blocked_once_monthly_traffic_is_exceeded() {
    let app = build_app(i64::MAX, 100 * 1024 * 1024 * 1024).await;
    let path = format!("/api/v0/files/{}/f", app.prefix);

    app.router.clone().oneshot(request("POST", path.clone(), Some(TOKEN), b"Dummy".to_vec())).await.unwrap();

    app.state.db.update_traffic(&app.prefix, 100 * 1024 * 1024 * 1024 + 1).await.unwrap();

    let resp = app.router.clone().oneshot(request("GET", path, None, vec![])).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED, "object exists but the prefix is over its traffic cap");
}

#[tokio::test]
async fn mutations_publish_the_expected_messages() {
    let app = build_app(i64::MAX, i64::MAX).await;
    let channel = format!("{}/f", app.prefix);
    let mut sub = app.state.pubsub.connect().await.unwrap();
    sub.subscribe(&channel, false).await.unwrap();

    let path = format!("/api/v0/files/{}/f", app.prefix);
    let resp = app.router.clone().oneshot(request("POST", path.clone(), Some(TOKEN), b"Dummy".to_vec())).await.unwrap();
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let posted = sub.next_message().await.unwrap().unwrap();
    assert_eq!(posted["operation"], "POST");
    assert_eq!(posted["prefix"], app.prefix);
    assert_eq!(posted["path"], channel);
    assert_eq!(posted["etag"], etag);

    app.router.clone().oneshot(request("DELETE", path, Some(TOKEN), vec![])).await.unwrap();
    let deleted = sub.next_message().await.unwrap().unwrap();
    assert_eq!(deleted["operation"], "DELETE");
    assert_eq!(deleted["prefix"], app.prefix);
    assert_eq!(deleted["path"], channel);
    assert!(deleted.get("etag").is_none());
}

#[tokio::test]
async fn if_match_precondition() {
    let app = build_app(i64::MAX, i64::MAX).await;
    let path = format!("/api/v0/files/{}/f", app.prefix);

    let req = Request::builder()
        .method("POST")
        .uri(path.clone())
        .header("authorization", TOKEN)
        .header("if-match", "bogus")
        .body(Body::from(b"Dummy".to_vec()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert!(resp.headers().get("etag").is_none());

    let resp = app.router.clone().oneshot(request("POST", path.clone(), Some(TOKEN), b"Dummy".to_vec())).await.unwrap();
    let etag = resp.headers().get("etag").unwrap().to_str().unwrap().to_string();

    let req = Request::builder()
        .method("POST")
        .uri(path.clone())
        .header("authorization", TOKEN)
        .header("if-match", "bogus")
        .body(Body::from(b"Other".to_vec()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(resp.headers().get("etag").unwrap().to_str().unwrap(), etag);

    let req = Request::builder()
        .method("POST")
        .uri(path)
        .header("authorization", TOKEN)
        .header("if-match", etag)
        .body(Body::from(b"Other".to_vec()))
        .unwrap();
    let resp = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(resp.headers().get("etag").is_some());
}
