use std::sync::Arc;

use anyhow::{Context, Result};
use idcheck_cloud::azure_blob::BlobConnection;
use idcheck_cloud::{AzureBlobBackend, AzureVisionAnalyzer, BlobImageStore, LocalBlobBackend, SqliteAttemptRepository};
use idcheck_core::{IdentityVerifier, ImageStore};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod server;

use config::{Config, StorageBackend};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("idcheckd starting");

    let config = Config::from_env().context("invalid configuration")?;

    let vision = AzureVisionAnalyzer::new(
        &config.vision_endpoint,
        &config.vision_key,
        config.call_timeout(),
    )?;
    tracing::info!(endpoint = %config.vision_endpoint, "vision analyzer configured");

    let images: Arc<dyn ImageStore> = match &config.storage {
        StorageBackend::Azure { connection_string } => {
            let connection = BlobConnection::parse(connection_string)?;
            tracing::info!(endpoint = %connection.endpoint, container = %config.container, "using azure blob storage");
            let backend = AzureBlobBackend::new(connection, &config.container, config.call_timeout())?;
            Arc::new(BlobImageStore::new(backend))
        }
        StorageBackend::Local { root } => {
            tracing::info!(root = %root.display(), container = %config.container, "using local image storage");
            Arc::new(BlobImageStore::new(LocalBlobBackend::new(root, &config.container)))
        }
    };

    let attempts = SqliteAttemptRepository::open(&config.db_path, config.db_busy_timeout())
        .await
        .with_context(|| format!("failed to open {}", config.db_path.display()))?;

    let verifier = IdentityVerifier::new(
        Arc::new(vision),
        images,
        Arc::new(attempts),
        config.call_timeout(),
    );

    let state = Arc::new(api::AppState {
        verifier,
        storage_backend: config.storage.name(),
        container: config.container.clone(),
    });

    tracing::info!(addr = %config.listen_addr, "idcheckd ready");
    server::serve(&config.listen_addr, state, config.max_body_bytes).await?;
    tracing::info!("idcheckd shut down");

    Ok(())
}
