//! File-storage backend on top of a block-blob service.
//!
//! [`AzureStorage`] maps the usual storage operations (exists, open, save,
//! delete, size, modified time, url) onto a [`BlobService`] client. Large
//! writes go through [`BlobFile`], which uploads fixed-size blocks as the
//! data arrives and commits them as one blob when the handle is closed.

mod block;
mod error;
mod file;
#[cfg(feature = "memory")]
mod memory;
mod service;
mod settings;
mod storage;

pub use block::block_id;
pub use chrono_tz::Tz;
pub use error::{ServiceError, StorageError};
pub use file::{BlobFile, OpenMode};
#[cfg(feature = "memory")]
pub use memory::MemoryBlobService;
pub use service::{
    BlobBlock, BlobProperties, BlobService, BlockState, ContentSettings, SasPermissions,
};
pub use settings::{
    DEFAULT_ACCOUNT_NAME, DEFAULT_BUFFER_SIZE, DEFAULT_MAX_MEMORY_SIZE, MAX_BLOCK_SIZE,
    StorageSettings,
};
pub use storage::{AzureStorage, ExpiryWindow, ModifiedTime, TimestampMode};
