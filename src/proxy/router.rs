//! HTTP router and handlers

use std::sync::Arc;

use axum::{
    Router,
    extract::{OriginalUri, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{MethodRouter, get},
};
use tower::ServiceBuilder;
use tower_http::{catch_panic::CatchPanicLayer, compression::CompressionLayer, trace::TraceLayer};
use tracing::warn;

use super::handler::ProxyHandler;
use super::policy::apply_cors_only;

/// Shared application state
pub struct AppState {
    /// Proxy pipeline
    pub handler: ProxyHandler,
}

/// Create the router
///
/// `GET /sofa/...` is proxied, `OPTIONS` anywhere is a preflight, any other
/// `GET` is a liveness probe answering `OK`. Everything else is 404.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/sofa/", proxy_routes())
        .route("/sofa/{*rest}", proxy_routes())
        .fallback(fallback_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::new())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}

/// Methods other than GET/HEAD/OPTIONS fall through to 404 like any unrouted path
fn proxy_routes() -> MethodRouter<Arc<AppState>> {
    get(proxy_handler)
        .options(preflight_handler)
        .fallback(fallback_handler)
}

/// GET /sofa/* handler
async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
) -> Response {
    let target = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());

    match state.handler.handle(target).await {
        Ok(response) => response.into_response(),
        Err(e) => {
            warn!(target = %target, error = %e, "Upstream fetch failed");
            let mut response = e.into_response();
            apply_cors_only(response.headers_mut());
            response
                .headers_mut()
                .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            response
        }
    }
}

/// OPTIONS handler for preflight requests
async fn preflight_handler(State(state): State<Arc<AppState>>) -> Response {
    state.handler.preflight().into_response()
}

/// Everything outside the proxy prefix
async fn fallback_handler(State(state): State<Arc<AppState>>, method: Method) -> Response {
    match method {
        Method::OPTIONS => state.handler.preflight().into_response(),
        Method::GET | Method::HEAD => (StatusCode::OK, "OK").into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::cache::ResponseCache;
    use crate::proxy::policy::TtlPolicy;
    use crate::proxy::upstream::tests::{Scripted, StubClient};
    use crate::proxy::upstream::{Upstream, UpstreamClient};

    const PRIMARY: &str = "https://api.example";
    const MIRROR: &str = "https://www.example";

    fn router(stub: &Arc<StubClient>) -> Router {
        let upstream = Upstream::new(
            Arc::clone(stub) as Arc<dyn UpstreamClient>,
            vec![PRIMARY.to_string(), MIRROR.to_string()],
        );
        let handler = ProxyHandler::new(
            Arc::new(ResponseCache::new()),
            upstream,
            TtlPolicy::default(),
        );
        create_router(Arc::new(AppState { handler }))
    }

    fn request(method: Method, uri: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_preflight_on_any_path() {
        let stub = Arc::new(StubClient::new(&[]));

        for uri in ["/", "/sofa/api/v1/x", "/anything?q=1"] {
            let response = router(&stub)
                .oneshot(request(Method::OPTIONS, uri))
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::NO_CONTENT, "{uri}");
            assert_eq!(
                response.headers()[header::CACHE_CONTROL],
                "public, max-age=600, stale-while-revalidate=30"
            );
            assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
            assert_eq!(
                response.headers()[header::ACCESS_CONTROL_ALLOW_HEADERS],
                "Content-Type"
            );
            assert!(body_string(response).await.is_empty());
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_catch_all_answers_ok() {
        let stub = Arc::new(StubClient::new(&[]));

        for uri in ["/", "/health", "/sofa", "/sofascore/x"] {
            let response = router(&stub)
                .oneshot(request(Method::GET, uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
            assert_eq!(body_string(response).await, "OK");
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_other_methods_are_not_found() {
        let stub = Arc::new(StubClient::new(&[]));

        for (method, uri) in [
            (Method::POST, "/"),
            (Method::POST, "/sofa/x"),
            (Method::DELETE, "/sofa/api/v1/event/1"),
            (Method::PUT, "/sofa/"),
        ] {
            let response = router(&stub)
                .oneshot(request(method.clone(), uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND, "{method} {uri}");
        }
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_handler_becomes_internal_error() {
        let stub = Arc::new(StubClient::new(&[(PRIMARY, vec![Scripted::Panic])]));
        let app = router(&stub);

        let response = app
            .clone()
            .oneshot(request(Method::GET, "/sofa/boom"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        // The same router keeps serving
        let response = app
            .oneshot(request(Method::GET, "/health"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "OK");
    }

    #[tokio::test]
    async fn test_proxy_route_forwards_stripped_path() {
        let stub = Arc::new(StubClient::new(&[(
            PRIMARY,
            vec![Scripted::Respond(200, "{\"events\":[]}")],
        )]));

        let response = router(&stub)
            .oneshot(request(
                Method::GET,
                "/sofa/api/v1/sport/football/events/live?fast=1",
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CACHE_CONTROL],
            "public, max-age=3, stale-while-revalidate=30"
        );
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(body_string(response).await, "{\"events\":[]}");
        assert_eq!(
            stub.calls(),
            vec![format!(
                "{PRIMARY}/api/v1/sport/football/events/live?fast=1"
            )]
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_is_bad_gateway_with_cors() {
        let stub = Arc::new(StubClient::new(&[
            (PRIMARY, vec![Scripted::Fail]),
            (MIRROR, vec![Scripted::Fail]),
        ]));

        let response = router(&stub)
            .oneshot(request(Method::GET, "/sofa/foo"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        assert!(body_string(response).await.contains("Upstream unavailable"));
    }
}
