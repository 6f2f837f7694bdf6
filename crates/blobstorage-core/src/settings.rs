use std::env;

use chrono_tz::Tz;

use crate::StorageError;

pub const DEFAULT_ACCOUNT_NAME: &str = "devstoreaccount1";
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;
pub const DEFAULT_MAX_MEMORY_SIZE: usize = 2 * 1024 * 1024;
/// Largest block the service accepts in one `put_block` call.
pub const MAX_BLOCK_SIZE: usize = 100 * 1024 * 1024;

/// Configuration of an [`AzureStorage`](crate::AzureStorage) backend.
#[derive(Clone, Debug)]
pub struct StorageSettings {
    pub account_name: String,
    pub account_key: String,
    pub container: String,
    /// Size in bytes of every uploaded block except possibly the last one.
    pub buffer_size: usize,
    /// Downloads larger than this spill from memory to a temporary file.
    pub max_memory_size: usize,
    pub custom_domain: Option<String>,
    pub ssl: bool,
    /// Lifetime of signed URLs when `url` is called without an expiry.
    pub url_expiration_secs: Option<u64>,
    pub time_zone: Tz,
    pub use_tz: bool,
}

impl StorageSettings {
    pub fn new(container: impl Into<String>) -> Self {
        Self {
            account_name: DEFAULT_ACCOUNT_NAME.to_string(),
            account_key: String::new(),
            container: container.into(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            max_memory_size: DEFAULT_MAX_MEMORY_SIZE,
            custom_domain: None,
            ssl: true,
            url_expiration_secs: None,
            time_zone: Tz::UTC,
            use_tz: true,
        }
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn with_time_zone(mut self, time_zone: Tz) -> Self {
        self.time_zone = time_zone;
        self
    }

    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, using the same variable
    /// names as [`StorageSettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StorageError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let container = lookup("AZURE_CONTAINER")
            .filter(|value| !value.is_empty())
            .ok_or_else(|| StorageError::Config("AZURE_CONTAINER must be set".to_string()))?;

        let mut settings = Self::new(container);
        if let Some(name) = lookup("AZURE_ACCOUNT_NAME") {
            settings.account_name = name;
        }
        if let Some(key) = lookup("AZURE_ACCOUNT_KEY") {
            settings.account_key = key;
        }
        if let Some(raw) = lookup("AZURE_BUFFER_SIZE") {
            settings.buffer_size = parse_number("AZURE_BUFFER_SIZE", &raw)?;
        }
        if let Some(raw) = lookup("AZURE_BLOB_MAX_MEMORY_SIZE") {
            settings.max_memory_size = parse_number("AZURE_BLOB_MAX_MEMORY_SIZE", &raw)?;
        }
        settings.custom_domain = lookup("AZURE_CUSTOM_DOMAIN").filter(|value| !value.is_empty());
        if let Some(raw) = lookup("AZURE_SSL") {
            settings.ssl = parse_flag("AZURE_SSL", &raw)?;
        }
        if let Some(raw) = lookup("AZURE_URL_EXPIRATION_SECS") {
            settings.url_expiration_secs = Some(parse_number("AZURE_URL_EXPIRATION_SECS", &raw)?);
        }
        if let Some(raw) = lookup("TIME_ZONE") {
            settings.time_zone = raw
                .parse()
                .map_err(|_| StorageError::Config(format!("unknown TIME_ZONE `{raw}`")))?;
        }
        if let Some(raw) = lookup("USE_TZ") {
            settings.use_tz = parse_flag("USE_TZ", &raw)?;
        }

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        if self.container.is_empty() {
            return Err(StorageError::Config("container name cannot be empty".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(StorageError::Config("buffer size must be at least 1 byte".to_string()));
        }
        if self.buffer_size > MAX_BLOCK_SIZE {
            return Err(StorageError::Config(format!(
                "buffer size {} exceeds the maximum block size of {MAX_BLOCK_SIZE} bytes",
                self.buffer_size
            )));
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, StorageError> {
    raw.trim()
        .parse()
        .map_err(|_| StorageError::Config(format!("{key} must be a non-negative integer (got `{raw}`)")))
}

fn parse_flag(key: &str, raw: &str) -> Result<bool, StorageError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(StorageError::Config(format!("{key} must be a boolean (got `{raw}`)"))),
    }
}
