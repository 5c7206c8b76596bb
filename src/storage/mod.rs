//! Storage abstraction over S3 and the local filesystem.
//!
//! A [`StorageProvider`] is rooted at a location (bucket + key prefix, or a
//! local directory). Every path passed in or handed back is relative to that
//! root.

mod local;
mod s3;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::{Captures, Regex};
use snafu::prelude::*;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::debug;

use crate::emit;
use crate::error::{InvalidUrlSnafu, ObjectStoreSnafu, StorageError};
use crate::metrics::events::{
    RequestStatus, StorageOperation, StorageRequest, StorageRequestDuration,
};

pub use local::LocalConfig;
pub use s3::S3Config;

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider bound to one root location.
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns, tried in order.
const S3_PATH: &str =
    r"^https://s3\.(?P<region>[\w\-]+)\.amazonaws\.com/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_VIRTUAL: &str =
    r"^https://(?P<bucket>[a-z0-9\-\.]+)\.s3\.(?P<region>[\w\-]+)\.amazonaws\.com(/(?P<key>.+))?$";
const S3_ENDPOINT_URL: &str = r"^[sS]3[aA]?::(?<protocol>https?)://(?P<endpoint>[^:/]+):(?<port>\d+)/(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)(/(?P<key>.+))?$";

const FILE_URI: &str = r"^file://(?P<path>/.*)$";
const FILE_PATH: &str = r"^(?P<path>/.*)$";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backend {
    S3,
    Local,
}

static MATCHERS: LazyLock<Vec<(Backend, Regex)>> = LazyLock::new(|| {
    [
        (Backend::S3, S3_PATH),
        (Backend::S3, S3_VIRTUAL),
        (Backend::S3, S3_ENDPOINT_URL),
        (Backend::S3, S3_URL),
        (Backend::Local, FILE_URI),
        (Backend::Local, FILE_PATH),
    ]
    .into_iter()
    .map(|(backend, pattern)| (backend, Regex::new(pattern).expect("URL pattern is valid")))
    .collect()
});

/// Where a provider is rooted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
}

impl BackendConfig {
    /// Parse a location string. Local locations must be absolute.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        let url = url.trim_end_matches('/');
        let found = MATCHERS
            .iter()
            .find_map(|(backend, regex)| regex.captures(url).map(|caps| (*backend, caps)));

        match found {
            Some((Backend::S3, caps)) => Ok(Self::parse_s3(caps)),
            Some((Backend::Local, caps)) => Ok(Self::parse_local(caps)),
            None => InvalidUrlSnafu {
                url: url.to_string(),
            }
            .fail(),
        }
    }

    fn parse_s3(caps: Captures) -> Self {
        let group = |name: &str| caps.name(name).map(|m| m.as_str().to_string());

        let region = std::env::var("AWS_DEFAULT_REGION")
            .ok()
            .or_else(|| group("region"));

        let endpoint = std::env::var("AWS_ENDPOINT").ok().or_else(|| {
            group("endpoint").map(|endpoint| {
                let port = group("port")
                    .and_then(|p| p.parse::<u16>().ok())
                    .unwrap_or(443);
                let protocol = group("protocol").unwrap_or_else(|| "https".to_string());
                format!("{protocol}://{endpoint}:{port}")
            })
        });

        BackendConfig::S3(S3Config {
            endpoint,
            region,
            bucket: group("bucket").unwrap_or_default(),
            key: group("key").map(Path::from),
        })
    }

    fn parse_local(caps: Captures) -> Self {
        let path = caps.name("path").map(|m| m.as_str()).unwrap_or("/");
        let path = if path.is_empty() { "/" } else { path };
        BackendConfig::Local(LocalConfig {
            path: path.to_string(),
        })
    }

    /// True for S3 locations, which need credentials.
    pub fn is_s3(&self) -> bool {
        matches!(self, BackendConfig::S3(_))
    }

    pub(crate) fn key(&self) -> Option<&Path> {
        match self {
            BackendConfig::S3(s3) => s3.key.as_ref(),
            BackendConfig::Local(_) => None,
        }
    }
}

impl StorageProvider {
    /// Open a provider for reading. A missing local directory is an error.
    pub async fn for_url_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        Self::open(url, options, false).await
    }

    /// Open a provider for writing, creating a missing local directory.
    pub async fn for_output_with_options(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        Self::open(url, options, true).await
    }

    async fn open(
        url: &str,
        options: HashMap<String, String>,
        create: bool,
    ) -> Result<Self, StorageError> {
        match BackendConfig::parse_url(url)? {
            BackendConfig::S3(config) => Self::construct_s3(config, options),
            BackendConfig::Local(config) => Self::construct_local(config, create).await,
        }
    }

    /// Printable root of this provider.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// Qualify a path with the configured key prefix.
    pub fn qualify_path<'a>(&self, path: &'a Path) -> Cow<'a, Path> {
        match self.config.key() {
            Some(prefix) => Cow::Owned(prefix.parts().chain(path.parts()).collect()),
            None => Cow::Borrowed(path),
        }
    }

    /// List every object under `prefix`, recursively.
    ///
    /// `prefix` is a directory relative to the root; `""` lists everything.
    /// Returned paths are relative to the root.
    pub fn list_with_prefix(
        &self,
        prefix: &str,
    ) -> impl Stream<Item = Result<Path, StorageError>> + '_ {
        emit!(StorageRequest {
            operation: StorageOperation::List,
            status: RequestStatus::Success,
        });

        let full_prefix = self.qualify_path(&Path::from(prefix)).into_owned();
        let key_part_count = self
            .config
            .key()
            .map(|key| key.parts().count())
            .unwrap_or_default();
        debug!("Listing {}/{}", self.canonical_url, prefix);

        let listing = if full_prefix.parts().next().is_none() {
            self.object_store.list(None)
        } else {
            self.object_store.list(Some(&full_prefix))
        };

        listing.map(move |meta| -> Result<Path, StorageError> {
            let meta = meta.context(ObjectStoreSnafu)?;
            Ok(meta.location.parts().skip(key_part_count).collect())
        })
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: &Path) -> Result<Bytes, StorageError> {
        let start = Instant::now();
        let result = self.object_store.get(&self.qualify_path(path)).await;
        record(StorageOperation::Get, result.is_ok(), start);

        result
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)
    }

    /// Put a payload to a path.
    pub async fn put_payload(&self, path: &Path, payload: PutPayload) -> Result<(), StorageError> {
        let path = self.qualify_path(path);
        let start = Instant::now();
        let result = self.object_store.put(&path, payload).await;
        record(StorageOperation::Put, result.is_ok(), start);

        result.context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Delete every object under `prefix`. Returns how many were removed.
    pub async fn delete_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let locations: Vec<Path> = self.list_with_prefix(prefix).try_collect().await?;
        if locations.is_empty() {
            return Ok(0);
        }

        let start = Instant::now();
        let qualified = futures::stream::iter(
            locations
                .iter()
                .map(|path| Ok(self.qualify_path(path).into_owned()))
                .collect::<Vec<_>>(),
        )
        .boxed();
        let result: Result<Vec<Path>, _> =
            self.object_store.delete_stream(qualified).try_collect().await;
        record(StorageOperation::Delete, result.is_ok(), start);

        let deleted = result.context(ObjectStoreSnafu)?;
        debug!("Deleted {} objects under {}", deleted.len(), prefix);
        Ok(deleted.len())
    }
}

fn record(operation: StorageOperation, ok: bool, start: Instant) {
    let status = if ok {
        RequestStatus::Success
    } else {
        RequestStatus::Error
    };
    emit!(StorageRequest { operation, status });
    emit!(StorageRequestDuration {
        operation,
        duration: start.elapsed(),
    });
}
