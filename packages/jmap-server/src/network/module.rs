//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections. This separation allows the rest of the application to
//! configure shared state (metadata store, object store, registry)
//! between `start()` and `serve()`.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::blob::{AllocateConfig, HmacUrlSigner};
use crate::dispatch::DispatcherConfig;
use crate::registry::RegistryHandle;
use crate::store::object::ObjectStore;
use crate::store::MetadataStore;

use super::config::NetworkConfig;
use super::handlers::{
    delete_handler_iam, download_handler, download_handler_iam, health_handler, jmap_handler, jmap_handler_iam,
    liveness_handler, readiness_handler, upload_handler, upload_handler_iam, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;

/// Everything the router needs besides [`NetworkConfig`] itself.
pub struct NetworkDependencies {
    pub store: Arc<dyn MetadataStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub registry: Arc<RegistryHandle>,
    pub dispatcher_config: Arc<DispatcherConfig>,
    pub allocate_config: Arc<AllocateConfig>,
    pub signer: Arc<HmacUrlSigner>,
}

/// Manages the full HTTP server lifecycle.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    deps: NetworkDependencies,
    listener: Option<TcpListener>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, deps: NetworkDependencies) -> Self {
        Self { config, deps, listener: None, shutdown: Arc::new(ShutdownController::new()) }
    }

    /// Returns a shared reference to the shutdown controller.
    ///
    /// Other modules use this to check health state or trigger shutdown.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    fn state(&self) -> AppState {
        AppState {
            store: Arc::clone(&self.deps.store),
            objects: Arc::clone(&self.deps.objects),
            registry: Arc::clone(&self.deps.registry),
            dispatcher_config: Arc::clone(&self.deps.dispatcher_config),
            allocate_config: Arc::clone(&self.deps.allocate_config),
            signer: Arc::clone(&self.deps.signer),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        }
    }

    /// Assembles the axum router with all routes and middleware.
    ///
    /// Routes (spec.md §6):
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - `POST /jmap`, `/jmap-iam/:accountId` -- JMAP method dispatch
    /// - `POST /upload/:accountId`, `/upload-iam/:accountId` -- legacy direct upload
    /// - `GET /download/:accountId/:blobId`, `/download-iam/:accountId/:blobId`
    /// - `DELETE /delete-iam/:accountId/:blobId`
    #[must_use]
    pub fn build_router(&self) -> Router {
        let state = self.state();
        let layers = build_http_layers(&self.config);

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/jmap", post(jmap_handler))
            .route("/jmap-iam/{accountId}", post(jmap_handler_iam))
            .route("/upload/{accountId}", post(upload_handler))
            .route("/upload-iam/{accountId}", post(upload_handler_iam))
            .route("/download/{accountId}/{blobId}", get(download_handler))
            .route("/download-iam/{accountId}/{blobId}", get(download_handler_iam))
            .route("/delete-iam/{accountId}/{blobId}", delete(delete_handler_iam))
            .layer(layers)
            .with_state(state)
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!("TCP listener bound to {}:{}", self.config.host, port);

        self.listener = Some(listener);
        Ok(port)
    }

    /// Starts serving connections until the shutdown signal fires.
    ///
    /// Consumes `self` because the listener is moved into the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server encounters a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> anyhow::Result<()> {
        let listener = self.listener.expect("start() must be called before serve()");
        let shutdown_ctrl = Arc::clone(&self.shutdown);
        let router = self.build_router();
        let tls = self.config.tls.clone();

        shutdown_ctrl.set_ready();

        if let Some(tls_config) = tls {
            serve_tls(listener, router, &tls_config, shutdown_ctrl, shutdown).await
        } else {
            serve_plain(listener, router, shutdown_ctrl, shutdown).await
        }
    }
}

async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Serving plain HTTP connections");

    axum::serve(listener, router).with_graceful_shutdown(shutdown).await?;
    drain(shutdown_ctrl).await;
    Ok(())
}

async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &super::config::TlsConfig,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_handle.graceful_shutdown(None);
    });

    info!("Serving TLS connections on {}", addr);

    axum_server::from_tcp_rustls(std_listener, rustls_config).handle(handle).serve(router.into_make_service()).await?;
    drain(shutdown_ctrl).await;
    Ok(())
}

/// Triggers the shutdown state transition and waits briefly for in-flight
/// requests to drain (no persistent connections to close, unlike a
/// websocket server, so there's nothing to actively drain besides
/// in-flight guards).
async fn drain(shutdown_ctrl: Arc<ShutdownController>) {
    shutdown_ctrl.trigger_shutdown();
    let drained = shutdown_ctrl.wait_for_drain(std::time::Duration::from_secs(30)).await;
    if !drained {
        tracing::warn!("drain timeout expired with in-flight requests remaining");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, RegistryHandle};
    use crate::store::memory::InMemoryMetadataStore;
    use crate::store::object_memory::InMemoryObjectStore;

    fn test_deps() -> NetworkDependencies {
        NetworkDependencies {
            store: Arc::new(InMemoryMetadataStore::new()),
            objects: Arc::new(InMemoryObjectStore::new()),
            registry: Arc::new(RegistryHandle::new(Registry::default())),
            dispatcher_config: Arc::new(DispatcherConfig::default()),
            allocate_config: Arc::new(AllocateConfig::default()),
            signer: Arc::new(HmacUrlSigner::new("cdn.example", "key1", b"secret".to_vec())),
        }
    }

    #[test]
    fn new_creates_module_without_binding() {
        let module = NetworkModule::new(NetworkConfig::default(), test_deps());
        assert!(module.listener.is_none());
    }

    #[test]
    fn shutdown_controller_returns_shared_arc() {
        let module = NetworkModule::new(NetworkConfig::default(), test_deps());
        let s1 = module.shutdown_controller();
        let s2 = module.shutdown_controller();
        assert!(Arc::ptr_eq(&s1, &s2));
    }

    #[test]
    fn build_router_creates_router() {
        let module = NetworkModule::new(NetworkConfig::default(), test_deps());
        let _router = module.build_router();
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_port() {
        let mut module = NetworkModule::new(NetworkConfig::default(), test_deps());
        let port = module.start().await.expect("start should succeed");
        assert!(port > 0, "OS-assigned port should be > 0");
        assert!(module.listener.is_some());
    }

    #[tokio::test]
    #[should_panic(expected = "start() must be called before serve()")]
    async fn serve_panics_without_start() {
        let module = NetworkModule::new(NetworkConfig::default(), test_deps());
        let _ = module.serve(std::future::pending::<()>()).await;
    }
}
