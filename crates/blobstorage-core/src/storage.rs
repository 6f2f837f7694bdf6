use std::{
    collections::BTreeSet,
    fmt,
    io::Read,
    sync::{Arc, OnceLock},
};

use chrono::{DateTime, NaiveDateTime, TimeDelta, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use crate::{
    BlobFile, BlobService, ContentSettings, OpenMode, SasPermissions, StorageError,
    StorageSettings,
};

type Connector = dyn Fn(&StorageSettings) -> Result<Arc<dyn BlobService>, StorageError> + Send + Sync;

/// Whether timestamps are handed out with or without their time zone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimestampMode {
    Aware,
    Naive,
}

impl TimestampMode {
    pub fn from_use_tz(use_tz: bool) -> Self {
        if use_tz {
            TimestampMode::Aware
        } else {
            TimestampMode::Naive
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModifiedTime {
    Aware(DateTime<Tz>),
    /// Wall-clock time in the configured zone, zone information dropped.
    Naive(NaiveDateTime),
}

impl ModifiedTime {
    pub fn is_aware(&self) -> bool {
        matches!(self, ModifiedTime::Aware(_))
    }
}

impl fmt::Display for ModifiedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModifiedTime::Aware(time) => write!(f, "{}", time.to_rfc3339()),
            ModifiedTime::Naive(time) => write!(f, "{}", time.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

/// Issue time and expiry of a shared access signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiryWindow {
    pub issued_at: DateTime<Utc>,
    /// `issued_at + expire` seconds, whole seconds, e.g. `2017-01-02T03:04:35Z`.
    pub expiry: String,
}

impl ExpiryWindow {
    pub fn starting_at(issued_at: DateTime<Utc>, expire: u64) -> Self {
        let seconds = i64::try_from(expire).unwrap_or(i64::MAX);
        let expires = TimeDelta::try_seconds(seconds)
            .and_then(|delta| issued_at.checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let expires = expires.with_nanosecond(0).unwrap_or(expires);
        Self {
            issued_at,
            expiry: expires.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}

/// Blob-storage backend: the file storage operations mapped onto a
/// [`BlobService`] container.
pub struct AzureStorage {
    settings: StorageSettings,
    connector: Box<Connector>,
    connection: OnceLock<Arc<dyn BlobService>>,
}

impl AzureStorage {
    /// The client is built by `connector` on first use and reused afterwards.
    pub fn new<F>(settings: StorageSettings, connector: F) -> Result<Self, StorageError>
    where
        F: Fn(&StorageSettings) -> Result<Arc<dyn BlobService>, StorageError> + Send + Sync + 'static,
    {
        settings.validate()?;
        Ok(Self {
            settings,
            connector: Box::new(connector),
            connection: OnceLock::new(),
        })
    }

    pub fn with_connection(
        settings: StorageSettings,
        connection: Arc<dyn BlobService>,
    ) -> Result<Self, StorageError> {
        settings.validate()?;
        Ok(Self {
            settings,
            connector: Box::new(|_: &StorageSettings| -> Result<Arc<dyn BlobService>, StorageError> {
                Err(StorageError::Config("connection was supplied up front".to_string()))
            }),
            connection: OnceLock::from(connection),
        })
    }

    pub fn settings(&self) -> &StorageSettings {
        &self.settings
    }

    pub fn container(&self) -> &str {
        &self.settings.container
    }

    pub fn connection(&self) -> Result<Arc<dyn BlobService>, StorageError> {
        if let Some(connection) = self.connection.get() {
            return Ok(Arc::clone(connection));
        }
        let built = (self.connector)(&self.settings)?;
        info!(
            account = %self.settings.account_name,
            container = %self.settings.container,
            "connected to blob service"
        );
        Ok(Arc::clone(self.connection.get_or_init(|| built)))
    }

    pub fn exists(&self, name: &str) -> Result<bool, StorageError> {
        let exists = self.connection()?.exists(self.container(), name)?;
        debug!(blob = name, exists, "checked blob existence");
        Ok(exists)
    }

    pub fn open(&self, name: &str, mode: OpenMode) -> Result<BlobFile, StorageError> {
        let connection = self.connection()?;
        match mode {
            OpenMode::Read => {
                BlobFile::open_read(connection, self.container(), name, self.settings.max_memory_size)
            }
            OpenMode::Write => {
                BlobFile::open_write(connection, self.container(), name, self.settings.buffer_size)
            }
        }
    }

    /// Stores `content` in one request, bypassing the block writer.
    pub fn save(&self, name: &str, content: &mut dyn Read) -> Result<String, StorageError> {
        let content_type = mime_guess::from_path(name).first_or_octet_stream();
        let content_settings = ContentSettings::with_content_type(content_type.essence_str());
        self.connection()?
            .create_blob_from_stream(self.container(), name, content, &content_settings)?;
        debug!(blob = name, content_type = %content_type, "saved blob");
        Ok(name.to_string())
    }

    pub fn delete(&self, name: &str) -> Result<(), StorageError> {
        self.connection()?.delete_blob(self.container(), name)?;
        debug!(blob = name, "deleted blob");
        Ok(())
    }

    pub fn size(&self, name: &str) -> Result<u64, StorageError> {
        let props = self.connection()?.get_blob_properties(self.container(), name)?;
        Ok(props.content_length)
    }

    pub fn get_modified_time(
        &self,
        name: &str,
        mode: TimestampMode,
    ) -> Result<ModifiedTime, StorageError> {
        let props = self.connection()?.get_blob_properties(self.container(), name)?;
        let local = props.last_modified.with_timezone(&self.settings.time_zone);
        Ok(match mode {
            TimestampMode::Aware => ModifiedTime::Aware(local),
            TimestampMode::Naive => ModifiedTime::Naive(local.naive_local()),
        })
    }

    /// [`get_modified_time`](Self::get_modified_time) using the configured `use_tz`.
    pub fn modified_time(&self, name: &str) -> Result<ModifiedTime, StorageError> {
        self.get_modified_time(name, TimestampMode::from_use_tz(self.settings.use_tz))
    }

    pub fn url(&self, name: &str, expire: Option<u64>) -> Result<String, StorageError> {
        let connection = self.connection()?;
        let container = self.container();
        let url = match expire.or(self.settings.url_expiration_secs) {
            None => connection.make_blob_url(container, name, None)?,
            Some(expire) => {
                let window = self.expire_at(expire);
                let token = connection.generate_blob_shared_access_signature(
                    container,
                    name,
                    SasPermissions::READ,
                    &window.expiry,
                )?;
                connection.make_blob_url(container, name, Some(&token))?
            }
        };
        Ok(url)
    }

    pub fn expire_at(&self, expire: u64) -> ExpiryWindow {
        ExpiryWindow::starting_at(Utc::now(), expire)
    }

    /// Lists the immediate sub-directories and files under `path`.
    pub fn listdir(&self, path: &str) -> Result<(Vec<String>, Vec<String>), StorageError> {
        let prefix = if path.is_empty() || path.ends_with('/') {
            path.to_string()
        } else {
            format!("{path}/")
        };
        let names = self.connection()?.list_blobs(self.container(), &prefix)?;

        let mut dirs = BTreeSet::new();
        let mut files = Vec::new();
        for name in &names {
            let Some(rest) = name.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => files.push(rest.to_string()),
            }
        }
        Ok((dirs.into_iter().collect(), files))
    }
}

impl fmt::Debug for AzureStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureStorage")
            .field("account", &self.settings.account_name)
            .field("container", &self.settings.container)
            .field("connected", &self.connection.get().is_some())
            .finish()
    }
}
