//! Binary entry point: wires configuration, storage, the plugin registry,
//! the dispatch pipeline, and the axum HTTP layer together, then serves
//! until a shutdown signal arrives.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use jmap_server::blob::{reap_expired_pending, AllocateConfig, HmacUrlSigner};
use jmap_server::dispatch::DispatcherConfig;
use jmap_server::network::module::NetworkDependencies;
use jmap_server::network::{NetworkConfig, NetworkModule};
use jmap_server::registry::{PluginRecord, Registry, RegistryHandle};
use jmap_server::store::memory::InMemoryMetadataStore;
use jmap_server::store::object_memory::InMemoryObjectStore;
use jmap_server::store::MetadataStore;

const BLOB_CAPABILITY: &str = "urn:ietf:params:jmap:blob";

/// Configuration for the JMAP blob storage service (spec.md §6).
#[derive(Debug, Parser)]
#[command(name = "jmap-serverd")]
struct Config {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    host: String,

    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    #[arg(long, env = "MAX_SIZE_UPLOAD_PUT", default_value_t = 250 * 1024 * 1024)]
    max_size_upload_put: u64,

    #[arg(long, env = "MAX_PENDING_ALLOCATIONS", default_value_t = 4)]
    max_pending_allocations: i64,

    #[arg(long, env = "ALLOCATION_URL_EXPIRY_SECONDS", default_value_t = 900)]
    allocation_url_expiry_seconds: u64,

    #[arg(long, env = "JMAP_DISPATCHER_PARALLELISM", default_value_t = 4)]
    jmap_dispatcher_parallelism: usize,

    #[arg(long, env = "REAPER_INTERVAL_SECONDS", default_value_t = 300)]
    reaper_interval_seconds: u64,

    #[arg(long, env = "PENDING_EXPIRY_GRACE_SECONDS", default_value_t = 60)]
    pending_expiry_grace_seconds: u64,

    #[arg(long, env = "CDN_DOMAIN", default_value = "cdn.example.com")]
    cdn_domain: String,

    #[arg(long, env = "CDN_SIGNING_KEY_ID", default_value = "default")]
    cdn_signing_key_id: String,

    #[arg(long, env = "CDN_SIGNING_SECRET", default_value = "change-me")]
    cdn_signing_secret: String,

    /// Comma-separated IAM principal ARNs allowed to reach the `-iam`
    /// download/delete/upload endpoints on behalf of any account.
    #[arg(long, env = "CLIENT_PRINCIPALS", value_delimiter = ',', default_value = "")]
    client_principals: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jmap_server::telemetry::init();
    let config = Config::parse();

    let store: Arc<dyn MetadataStore> = Arc::new(InMemoryMetadataStore::new());
    let objects: Arc<dyn jmap_server::store::object::ObjectStore> = Arc::new(InMemoryObjectStore::new());

    let registry = Registry::from_records(vec![
        PluginRecord { method_name: "Blob/allocate".into(), capability: BLOB_CAPABILITY.into(), allowed_principals: None },
        PluginRecord { method_name: "Blob/complete".into(), capability: BLOB_CAPABILITY.into(), allowed_principals: None },
    ])
    .with_client_principals(config.client_principals.iter().filter(|p| !p.is_empty()).cloned());
    let registry = Arc::new(RegistryHandle::new(registry));

    let allocate_config = Arc::new(AllocateConfig {
        max_size_upload_put: config.max_size_upload_put,
        max_pending_allocations: config.max_pending_allocations,
        allocation_url_expiry_seconds: config.allocation_url_expiry_seconds,
        ..AllocateConfig::default()
    });
    let dispatcher_config = Arc::new(DispatcherConfig { worker_pool_size: config.jmap_dispatcher_parallelism, ..DispatcherConfig::default() });
    let signer = Arc::new(HmacUrlSigner::new(config.cdn_domain.clone(), config.cdn_signing_key_id.clone(), config.cdn_signing_secret.into_bytes()));

    let reaper_store = Arc::clone(&store);
    let reaper_objects = Arc::clone(&objects);
    let reaper_interval = Duration::from_secs(config.reaper_interval_seconds);
    let reaper_grace = Duration::from_secs(config.pending_expiry_grace_seconds);
    let reaper_cancel = CancellationToken::new();
    let reaper_task_cancel = reaper_cancel.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(reaper_interval);
        loop {
            ticker.tick().await;
            if reaper_task_cancel.is_cancelled() {
                return;
            }
            let now = jmap_server::blob::types::now_millis();
            match reap_expired_pending(reaper_store.as_ref(), reaper_objects.as_ref(), now, reaper_grace, &reaper_task_cancel).await {
                Ok(summary) => tracing::info!(?summary, "pending-allocation reap sweep completed"),
                Err(err) => tracing::error!(%err, "pending-allocation reap sweep failed"),
            }
        }
    });

    let net_config = NetworkConfig { host: config.host, port: config.port, ..NetworkConfig::default() };
    let deps = NetworkDependencies { store, objects, registry, dispatcher_config, allocate_config, signer };
    let mut module = NetworkModule::new(net_config, deps);
    let port = module.start().await?;
    tracing::info!(port, "jmap-serverd listening");

    module
        .serve(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    reaper_cancel.cancel();
    Ok(())
}
