//! End-to-end tests: real HTTP between caller, proxy and stub origins
//!
//! Each stub origin is an axum server on an ephemeral port that counts hits
//! and records the headers it received.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use reqwest::Client;
use tokio::net::TcpListener;

use sofa_proxy::config::Config;
use sofa_proxy::proxy::ProxyServer;

struct StubOrigin {
    status: StatusCode,
    body: &'static str,
    delay: Duration,
    hits: AtomicUsize,
    seen: Mutex<Vec<(String, HeaderMap)>>,
}

impl StubOrigin {
    fn new(status: u16, body: &'static str) -> Arc<Self> {
        Self::slow(status, body, Duration::ZERO)
    }

    fn slow(status: u16, body: &'static str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            status: StatusCode::from_u16(status).unwrap(),
            body,
            delay,
            hits: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_request(&self) -> (String, HeaderMap) {
        self.seen.lock().unwrap().last().cloned().expect("origin was called")
    }
}

async fn stub_handler(
    State(origin): State<Arc<StubOrigin>>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
) -> impl IntoResponse {
    origin.hits.fetch_add(1, Ordering::SeqCst);
    origin
        .seen
        .lock()
        .unwrap()
        .push((uri.to_string(), headers));
    if !origin.delay.is_zero() {
        tokio::time::sleep(origin.delay).await;
    }
    (
        origin.status,
        [(header::CONTENT_TYPE, "application/json"), (header::ETAG, "\"v1\"")],
        origin.body,
    )
}

async fn spawn_origin(origin: Arc<StubOrigin>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(stub_handler).with_state(origin);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// An address nothing is listening on
async fn closed_origin() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn client() -> Client {
    Client::builder().no_proxy().build().unwrap()
}

async fn spawn_proxy(origins: Vec<String>, timeout: Duration) -> SocketAddr {
    let mut config = Config::default();
    config.upstream.origins = origins;
    config.upstream.timeout = timeout;
    config.upstream.system_proxy = false;

    let server = ProxyServer::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        server
            .serve(listener, std::future::pending())
            .await
            .unwrap();
    });
    addr
}

#[tokio::test]
async fn test_forbidden_primary_falls_back_and_caches_mirror() {
    let primary = StubOrigin::new(403, "{\"error\":\"forbidden\"}");
    let mirror = StubOrigin::new(200, "ok");
    let proxy = spawn_proxy(
        vec![
            spawn_origin(Arc::clone(&primary)).await,
            spawn_origin(Arc::clone(&mirror)).await,
        ],
        Duration::from_secs(5),
    )
    .await;
    let client = client();
    let url = format!("http://{proxy}/sofa/api/v1/event/123");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(
        first.headers()[header::CACHE_CONTROL],
        "public, max-age=15, stale-while-revalidate=30"
    );
    assert_eq!(first.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(first.headers()[header::ETAG], "\"v1\"");
    assert_eq!(first.text().await.unwrap(), "ok");
    assert_eq!(primary.hits(), 1);
    assert_eq!(mirror.hits(), 1);

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.text().await.unwrap(), "ok");
    assert_eq!(primary.hits(), 1, "served from cache");
    assert_eq!(mirror.hits(), 1, "served from cache");
}

#[tokio::test]
async fn test_upstream_sees_stripped_path_and_browser_headers() {
    let primary = StubOrigin::new(200, "{}");
    let proxy = spawn_proxy(
        vec![spawn_origin(Arc::clone(&primary)).await],
        Duration::from_secs(5),
    )
    .await;

    let response = client()
        .get(format!("http://{proxy}/sofa/api/v1/sport/football/events/live?fast=1"))
        .header("x-client-secret", "do-not-forward")
        .send()
        .await
        .unwrap();
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=3, stale-while-revalidate=30"
    );

    let (uri, headers) = primary.last_request();
    assert_eq!(uri, "/api/v1/sport/football/events/live?fast=1");
    assert_eq!(headers[header::ORIGIN], "https://www.sofascore.com");
    assert_eq!(headers[header::REFERER], "https://www.sofascore.com/");
    assert_eq!(headers["sec-fetch-mode"], "cors");
    assert_eq!(headers["x-requested-with"], "XMLHttpRequest");
    assert!(
        headers[header::USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("Mozilla/5.0")
    );
    assert!(headers.get("x-client-secret").is_none());
}

#[tokio::test]
async fn test_double_rejection_is_passed_through() {
    let primary = StubOrigin::new(401, "primary");
    let mirror = StubOrigin::new(401, "mirror");
    let proxy = spawn_proxy(
        vec![
            spawn_origin(Arc::clone(&primary)).await,
            spawn_origin(Arc::clone(&mirror)).await,
        ],
        Duration::from_secs(5),
    )
    .await;

    let response = client()
        .get(format!("http://{proxy}/sofa/foo?fast=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=30, stale-while-revalidate=30"
    );
    assert_eq!(response.text().await.unwrap(), "mirror");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let proxy = spawn_proxy(
        vec![closed_origin().await, closed_origin().await],
        Duration::from_secs(2),
    )
    .await;

    let response = client()
        .get(format!("http://{proxy}/sofa/foo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
}

#[tokio::test]
async fn test_slow_upstream_times_out() {
    let slow = StubOrigin::slow(200, "late", Duration::from_secs(5));
    let proxy = spawn_proxy(
        vec![spawn_origin(Arc::clone(&slow)).await],
        Duration::from_millis(200),
    )
    .await;

    let response = client()
        .get(format!("http://{proxy}/sofa/foo"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
}

#[tokio::test]
async fn test_preflight_and_liveness() {
    let proxy = spawn_proxy(vec![closed_origin().await], Duration::from_secs(2)).await;
    let client = client();

    let preflight = client
        .request(reqwest::Method::OPTIONS, format!("http://{proxy}/sofa/foo"))
        .send()
        .await
        .unwrap();
    assert_eq!(preflight.status(), StatusCode::NO_CONTENT);
    assert_eq!(
        preflight.headers()[header::CACHE_CONTROL],
        "public, max-age=600, stale-while-revalidate=30"
    );
    assert!(preflight.bytes().await.unwrap().is_empty());

    let live = client
        .get(format!("http://{proxy}/"))
        .send()
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);
    assert_eq!(live.text().await.unwrap(), "OK");
}
