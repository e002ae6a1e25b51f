//! Proxy server

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::handler::ProxyHandler;
use super::policy::TtlPolicy;
use super::router::{AppState, create_router};
use super::upstream::{HttpClient, Upstream, UpstreamClient};
use crate::cache::{ResponseCache, now_millis};
use crate::config::Config;
use crate::{Error, Result};

/// SofaScore proxy server
pub struct ProxyServer {
    /// Configuration
    config: Config,
    /// Shared response cache
    cache: Arc<ResponseCache>,
    /// Upstream client
    client: Arc<dyn UpstreamClient>,
}

impl ProxyServer {
    /// Create a server that reaches upstream over HTTP
    pub fn new(config: Config) -> Result<Self> {
        let client = Arc::new(HttpClient::new(&config.upstream)?);
        Ok(Self::with_client(config, client))
    }

    /// Create a server with a caller-supplied upstream client
    #[must_use]
    pub fn with_client(config: Config, client: Arc<dyn UpstreamClient>) -> Self {
        Self {
            config,
            cache: Arc::new(ResponseCache::new()),
            client,
        }
    }

    /// Shared response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Bind the configured address and serve until a shutdown signal arrives
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let (shutdown_tx, _) = broadcast::channel(1);

        let upstream = Upstream::new(
            Arc::clone(&self.client),
            self.config.upstream.origins.clone(),
        );
        let handler = ProxyHandler::new(
            Arc::clone(&self.cache),
            upstream,
            TtlPolicy::from_config(&self.config.cache),
        );
        let app = create_router(Arc::new(AppState { handler }));

        let local_addr = listener.local_addr()?;
        info!("============================================================");
        info!("SOFA PROXY v{}", env!("CARGO_PKG_VERSION"));
        info!("============================================================");
        info!(addr = %local_addr, "Listening");
        info!("  GET  http://{local_addr}/sofa/<path>  (proxied)");
        for (i, origin) in self.config.upstream.origins.iter().enumerate() {
            info!("  upstream #{}: {}", i + 1, origin);
        }
        info!(
            timeout = ?self.config.upstream.timeout,
            default_ttl = ?self.config.cache.default_ttl,
            fast_ttl = ?self.config.cache.fast_ttl,
            auth_failure_ttl = ?self.config.cache.auth_failure_ttl,
            "Cache policy"
        );
        info!("============================================================");

        spawn_sweeper(
            Arc::clone(&self.cache),
            self.config.cache.sweep_interval,
            shutdown_tx.subscribe(),
        );

        let notify = shutdown_tx.clone();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.await;
                let _ = notify.send(());
            })
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        let stats = self.cache.stats();
        info!(
            hits = stats.hits,
            misses = stats.misses,
            entries = stats.size,
            "Proxy stopped"
        );
        Ok(())
    }
}

/// Periodically drop stale entries so keys that are never requested again
/// do not stay resident. A zero interval disables the sweeper.
fn spawn_sweeper(
    cache: Arc<ResponseCache>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    if every.is_zero() {
        debug!("Cache sweeper disabled");
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // First tick completes immediately
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = cache.evict_expired(now_millis());
                    let stats = cache.stats();
                    debug!(
                        removed,
                        entries = stats.size,
                        hits = stats.hits,
                        misses = stats.misses,
                        hit_rate = stats.hit_rate,
                        "Cache sweep"
                    );
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }
    });
}

/// Shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
