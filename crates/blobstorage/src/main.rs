use std::sync::Arc;

use blobstorage::{AnyError, AppState, Settings, build_router};
use blobstorage_core::{AzureStorage, BlobService, MemoryBlobService};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(err) = run().await {
        error!("storage node failed: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), AnyError> {
    let settings = Settings::from_env()?;
    // The node serves a local in-process blob service.
    let storage = AzureStorage::new(settings.storage, |settings| {
        let service: Arc<dyn BlobService> = Arc::new(MemoryBlobService::from_settings(settings));
        Ok(service)
    })?;
    let container = storage.container().to_string();
    let state = AppState {
        storage: Arc::new(storage),
    };
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.bind_address).await?;
    info!(
        "listening on http://{} (container: {container})",
        settings.bind_address
    );
    axum::serve(listener, router).await?;
    Ok(())
}
