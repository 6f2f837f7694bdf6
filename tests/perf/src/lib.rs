// Performance tests for the blob storage backend
// Run with: cargo test -p perf --release -- --nocapture --test-threads=1

use std::sync::Arc;

use blobstorage_core::{AzureStorage, BlobService, MemoryBlobService, StorageSettings};

mod http_perf;
mod storage_perf;

pub const CONTAINER: &str = "perf";

/// Storage over a fresh in-memory service.
pub fn memory_storage(buffer_size: usize) -> Arc<AzureStorage> {
    let settings = StorageSettings::new(CONTAINER).with_buffer_size(buffer_size);
    let service: Arc<dyn BlobService> = Arc::new(MemoryBlobService::from_settings(&settings));
    Arc::new(AzureStorage::with_connection(settings, service).unwrap())
}
