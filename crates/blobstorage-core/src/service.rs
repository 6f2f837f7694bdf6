//! The slice of a blob-service client the storage backend relies on.
//!
//! Implementations own connection handling, authentication and request
//! signing. The backend only ever talks to the service through this trait,
//! which is what lets tests swap in a recording fake.

use std::{
    fmt,
    io::{Read, Write},
};

use chrono::{DateTime, Utc};

use crate::ServiceError;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ContentSettings {
    pub content_type: Option<String>,
}

impl ContentSettings {
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobProperties {
    pub content_length: u64,
    pub last_modified: DateTime<Utc>,
    pub content_settings: ContentSettings,
}

/// Which staged copy of a block a block list entry refers to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlockState {
    Committed,
    Uncommitted,
    /// Most recently uploaded version, uncommitted first then committed.
    #[default]
    Latest,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobBlock {
    pub id: String,
    pub state: BlockState,
}

impl BlobBlock {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: BlockState::default(),
        }
    }
}

/// Permissions granted by a shared access signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SasPermissions {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
}

impl SasPermissions {
    pub const READ: Self = Self {
        read: true,
        write: false,
        delete: false,
    };
}

impl fmt::Display for SasPermissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.read {
            f.write_str("r")?;
        }
        if self.write {
            f.write_str("w")?;
        }
        if self.delete {
            f.write_str("d")?;
        }
        Ok(())
    }
}

pub trait BlobService: Send + Sync {
    fn exists(&self, container: &str, blob: &str) -> Result<bool, ServiceError>;

    fn get_blob_properties(&self, container: &str, blob: &str)
    -> Result<BlobProperties, ServiceError>;

    /// Downloads the whole blob into `stream`. `max_connections` bounds the
    /// number of parallel range requests; `1` means one sequential download.
    fn get_blob_to_stream(
        &self,
        container: &str,
        blob: &str,
        stream: &mut dyn Write,
        max_connections: usize,
    ) -> Result<BlobProperties, ServiceError>;

    /// Puts an empty block blob, replacing any previous content.
    fn create_blob(&self, container: &str, blob: &str) -> Result<(), ServiceError>;

    fn put_block(
        &self,
        container: &str,
        blob: &str,
        block: &[u8],
        block_id: &str,
    ) -> Result<(), ServiceError>;

    fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        blocks: &[BlobBlock],
    ) -> Result<(), ServiceError>;

    fn create_blob_from_stream(
        &self,
        container: &str,
        blob: &str,
        stream: &mut dyn Read,
        content_settings: &ContentSettings,
    ) -> Result<(), ServiceError>;

    fn delete_blob(&self, container: &str, blob: &str) -> Result<(), ServiceError>;

    /// Names of all committed blobs starting with `prefix`, sorted.
    fn list_blobs(&self, container: &str, prefix: &str) -> Result<Vec<String>, ServiceError>;

    fn generate_blob_shared_access_signature(
        &self,
        container: &str,
        blob: &str,
        permission: SasPermissions,
        expiry: &str,
    ) -> Result<String, ServiceError>;

    fn make_blob_url(
        &self,
        container: &str,
        blob: &str,
        sas_token: Option<&str>,
    ) -> Result<String, ServiceError>;
}
