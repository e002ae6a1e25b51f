//! Caching reverse proxy for the SofaScore API

mod handler;
mod policy;
mod router;
mod server;
mod upstream;

pub use handler::{PROXY_PREFIX, ProxyHandler, ProxyResponse, upstream_path};
pub use policy::{TtlPolicy, apply_cors, has_fast_flag, is_auth_rejection};
pub use router::{AppState, create_router};
pub use server::ProxyServer;
pub use upstream::{HttpClient, Upstream, UpstreamClient, UpstreamResponse, forwardable_headers};
