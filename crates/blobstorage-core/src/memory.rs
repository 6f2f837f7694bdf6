//! In-process [`BlobService`] used for local development, demos and tests.
//!
//! It models the parts of a block-blob service the backend depends on:
//! containers, staged (uncommitted) blocks, block list commits, properties
//! and signed URLs. Nothing is persisted.

use std::{
    collections::{BTreeMap, HashMap},
    io::{Read, Write},
    sync::{Mutex, MutexGuard},
};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use chrono::{DateTime, SubsecRound, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::Sha256;

use crate::{
    BlobBlock, BlobProperties, BlobService, BlockState, ContentSettings, SasPermissions,
    ServiceError, StorageSettings,
};

type HmacSha256 = Hmac<Sha256>;

const SAS_VERSION: &str = "2017-04-17";

const URL_PATH_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

#[derive(Debug)]
struct StoredBlob {
    content: Vec<u8>,
    /// Blocks referenced by the last committed block list.
    committed: HashMap<String, Vec<u8>>,
    content_settings: ContentSettings,
    last_modified: DateTime<Utc>,
}

impl StoredBlob {
    fn new(content: Vec<u8>, content_settings: ContentSettings) -> Self {
        Self {
            content,
            committed: HashMap::new(),
            content_settings,
            last_modified: Utc::now().trunc_subsecs(0),
        }
    }

    fn properties(&self) -> BlobProperties {
        BlobProperties {
            content_length: self.content.len() as u64,
            last_modified: self.last_modified,
            content_settings: self.content_settings.clone(),
        }
    }
}

#[derive(Debug, Default)]
struct Container {
    blobs: BTreeMap<String, StoredBlob>,
    staged: HashMap<String, HashMap<String, Vec<u8>>>,
}

#[derive(Debug, Default)]
struct State {
    containers: HashMap<String, Container>,
}

#[derive(Debug)]
pub struct MemoryBlobService {
    account_name: String,
    account_key: Vec<u8>,
    base_url: String,
    state: Mutex<State>,
}

impl MemoryBlobService {
    pub fn new(account_name: &str, account_key: &str) -> Self {
        Self {
            account_name: account_name.to_string(),
            account_key: account_key.as_bytes().to_vec(),
            base_url: format!("https://{account_name}.blob.core.windows.net"),
            state: Mutex::new(State::default()),
        }
    }

    /// A service whose URLs follow `settings` (account, custom domain, scheme)
    /// with `settings.container` already created.
    pub fn from_settings(settings: &StorageSettings) -> Self {
        let scheme = if settings.ssl { "https" } else { "http" };
        let host = settings
            .custom_domain
            .clone()
            .unwrap_or_else(|| format!("{}.blob.core.windows.net", settings.account_name));
        let service = Self {
            base_url: format!("{scheme}://{host}"),
            ..Self::new(&settings.account_name, &settings.account_key)
        };
        service.create_container(&settings.container);
        service
    }

    pub fn create_container(&self, container: &str) {
        self.lock().containers.entry(container.to_string()).or_default();
    }

    /// Number of blocks staged for `blob` and not yet committed.
    pub fn staged_block_count(&self, container: &str, blob: &str) -> usize {
        self.lock()
            .containers
            .get(container)
            .and_then(|c| c.staged.get(blob))
            .map_or(0, HashMap::len)
    }

    /// Checks a token produced by
    /// [`generate_blob_shared_access_signature`](BlobService::generate_blob_shared_access_signature)
    /// for `blob` against the account key and `now`.
    pub fn verify_sas(&self, container: &str, blob: &str, token: &str, now: DateTime<Utc>) -> bool {
        let params: HashMap<&str, String> = token
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .filter_map(|(key, value)| {
                percent_encoding::percent_decode_str(value)
                    .decode_utf8()
                    .ok()
                    .map(|value| (key, value.into_owned()))
            })
            .collect();
        let (Some(permission), Some(expiry), Some(signature)) =
            (params.get("sp"), params.get("se"), params.get("sig"))
        else {
            return false;
        };
        let Ok(expires) = DateTime::parse_from_rfc3339(expiry) else {
            return false;
        };
        if expires.with_timezone(&Utc) < now {
            return false;
        }
        self.sign(container, blob, permission, expiry) == *signature
    }

    fn sign(&self, container: &str, blob: &str, permission: &str, expiry: &str) -> String {
        let string_to_sign = format!(
            "{permission}\n\n{expiry}\n/blob/{}/{container}/{blob}\n\n\n\n{SAS_VERSION}",
            self.account_name
        );
        // HMAC accepts keys of any length.
        let mut mac = match HmacSha256::new_from_slice(&self.account_key) {
            Ok(mac) => mac,
            Err(_) => return String::new(),
        };
        mac.update(string_to_sign.as_bytes());
        BASE64_STANDARD.encode(mac.finalize().into_bytes())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn container_mut<'a>(
    state: &'a mut State,
    container: &str,
) -> Result<&'a mut Container, ServiceError> {
    state
        .containers
        .get_mut(container)
        .ok_or_else(|| ServiceError::ContainerNotFound(container.to_string()))
}

impl BlobService for MemoryBlobService {
    fn exists(&self, container: &str, blob: &str) -> Result<bool, ServiceError> {
        let state = self.lock();
        Ok(state
            .containers
            .get(container)
            .is_some_and(|c| c.blobs.contains_key(blob)))
    }

    fn get_blob_properties(
        &self,
        container: &str,
        blob: &str,
    ) -> Result<BlobProperties, ServiceError> {
        let mut state = self.lock();
        container_mut(&mut state, container)?
            .blobs
            .get(blob)
            .map(StoredBlob::properties)
            .ok_or_else(|| ServiceError::blob_not_found(container, blob))
    }

    fn get_blob_to_stream(
        &self,
        container: &str,
        blob: &str,
        stream: &mut dyn Write,
        _max_connections: usize,
    ) -> Result<BlobProperties, ServiceError> {
        let (content, props) = {
            let mut state = self.lock();
            let stored = container_mut(&mut state, container)?
                .blobs
                .get(blob)
                .ok_or_else(|| ServiceError::blob_not_found(container, blob))?;
            (stored.content.clone(), stored.properties())
        };
        stream.write_all(&content)?;
        Ok(props)
    }

    fn create_blob(&self, container: &str, blob: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let target = container_mut(&mut state, container)?;
        target.staged.remove(blob);
        target
            .blobs
            .insert(blob.to_string(), StoredBlob::new(Vec::new(), ContentSettings::default()));
        Ok(())
    }

    fn put_block(
        &self,
        container: &str,
        blob: &str,
        block: &[u8],
        block_id: &str,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        container_mut(&mut state, container)?
            .staged
            .entry(blob.to_string())
            .or_default()
            .insert(block_id.to_string(), block.to_vec());
        Ok(())
    }

    fn put_block_list(
        &self,
        container: &str,
        blob: &str,
        blocks: &[BlobBlock],
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let target = container_mut(&mut state, container)?;
        let staged = target.staged.get(blob);
        let previous = target.blobs.get(blob).map(|stored| &stored.committed);

        let mut content = Vec::new();
        let mut committed = HashMap::new();
        for entry in blocks {
            let from_staged = || staged.and_then(|s| s.get(&entry.id));
            let from_committed = || previous.and_then(|c| c.get(&entry.id));
            let data = match entry.state {
                BlockState::Uncommitted => from_staged(),
                BlockState::Committed => from_committed(),
                BlockState::Latest => from_staged().or_else(from_committed),
            }
            .ok_or_else(|| {
                ServiceError::InvalidBlockList(format!("block `{}` of `{blob}` is unknown", entry.id))
            })?;
            content.extend_from_slice(data);
            committed.insert(entry.id.clone(), data.clone());
        }

        let content_settings = target
            .blobs
            .get(blob)
            .map(|stored| stored.content_settings.clone())
            .unwrap_or_default();
        let mut stored = StoredBlob::new(content, content_settings);
        stored.committed = committed;
        target.staged.remove(blob);
        target.blobs.insert(blob.to_string(), stored);
        Ok(())
    }

    fn create_blob_from_stream(
        &self,
        container: &str,
        blob: &str,
        stream: &mut dyn Read,
        content_settings: &ContentSettings,
    ) -> Result<(), ServiceError> {
        let mut content = Vec::new();
        stream.read_to_end(&mut content)?;

        let mut state = self.lock();
        let target = container_mut(&mut state, container)?;
        target.staged.remove(blob);
        target
            .blobs
            .insert(blob.to_string(), StoredBlob::new(content, content_settings.clone()));
        Ok(())
    }

    fn delete_blob(&self, container: &str, blob: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        let target = container_mut(&mut state, container)?;
        target.staged.remove(blob);
        match target.blobs.remove(blob) {
            Some(_) => Ok(()),
            None => Err(ServiceError::blob_not_found(container, blob)),
        }
    }

    fn list_blobs(&self, container: &str, prefix: &str) -> Result<Vec<String>, ServiceError> {
        let mut state = self.lock();
        let target = container_mut(&mut state, container)?;
        Ok(target
            .blobs
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    fn generate_blob_shared_access_signature(
        &self,
        container: &str,
        blob: &str,
        permission: SasPermissions,
        expiry: &str,
    ) -> Result<String, ServiceError> {
        if self.account_key.is_empty() {
            return Err(ServiceError::Authentication(
                "an account key is required to sign URLs".to_string(),
            ));
        }
        let permission = permission.to_string();
        let signature = self.sign(container, blob, &permission, expiry);
        Ok(format!(
            "se={}&sp={permission}&sv={SAS_VERSION}&sr=b&sig={}",
            utf8_percent_encode(expiry, QUERY_ENCODE_SET),
            utf8_percent_encode(&signature, QUERY_ENCODE_SET)
        ))
    }

    fn make_blob_url(
        &self,
        container: &str,
        blob: &str,
        sas_token: Option<&str>,
    ) -> Result<String, ServiceError> {
        let mut url = format!(
            "{}/{container}/{}",
            self.base_url,
            utf8_percent_encode(blob, URL_PATH_ENCODE_SET)
        );
        if let Some(token) = sas_token {
            url.push('?');
            url.push_str(token);
        }
        Ok(url)
    }
}
