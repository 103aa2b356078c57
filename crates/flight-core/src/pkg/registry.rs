//! npm registry client and packument cache.

use super::error::PkgError;
use super::lockfile::EntryFields;
use super::spec::escape_name;
use futures::future::try_join_all;
use reqwest::Client;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use url::Url;

/// Default npm registry URL.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Environment variable to override registry URL.
pub const REGISTRY_ENV: &str = "FLIGHT_NPM_REGISTRY";

/// Registry document for one package name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Packument {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "dist-tags", default, deserialize_with = "string_map")]
    pub dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    pub versions: BTreeMap<String, PackumentVersion>,
}

impl Packument {
    /// The `latest` dist-tag, if published.
    #[must_use]
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }
}

/// Per-version metadata inside a packument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackumentVersion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub dependencies: BTreeMap<String, String>,
    /// Misspelled dependency map some registries still publish.
    #[serde(
        rename = "depedencies",
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub legacy_dependencies: BTreeMap<String, String>,
    #[serde(
        rename = "peerDependencies",
        default,
        deserialize_with = "string_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dist: Option<Dist>,
    #[serde(flatten)]
    pub fields: EntryFields,
}

impl PackumentVersion {
    /// Regular dependencies; the correctly spelled map wins over the legacy one.
    #[must_use]
    pub fn effective_dependencies(&self) -> BTreeMap<String, String> {
        let mut deps = self.legacy_dependencies.clone();
        deps.extend(
            self.dependencies
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        deps
    }

    /// Everything the resolver expands below this version.
    ///
    /// Peer ranges override regular ranges declared for the same name.
    #[must_use]
    pub fn expansion_set(&self) -> BTreeMap<String, String> {
        let mut deps = self.effective_dependencies();
        deps.extend(
            self.peer_dependencies
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        deps
    }
}

/// Distribution info for a published version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dist {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tarball: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,
}

/// Deserialize a `name -> string` map, dropping entries whose value is not a string.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<BTreeMap<String, Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::String(s) => Some((k, s)),
            _ => None,
        })
        .collect())
}

/// Anything that can produce a packument for a package name.
#[allow(async_fn_in_trait)]
pub trait PackumentSource {
    /// Fetch the packument for `name` (unescaped).
    async fn fetch_packument(&self, name: &str) -> Result<Packument, PkgError>;
}

impl<S: PackumentSource> PackumentSource for &S {
    async fn fetch_packument(&self, name: &str) -> Result<Packument, PkgError> {
        (**self).fetch_packument(name).await
    }
}

/// HTTP client for an npm-compatible registry.
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base_url: Url,
    http: Client,
}

impl RegistryClient {
    /// Create a new registry client with the given base URL.
    ///
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be created.
    pub fn new(base_url: &str) -> Result<Self, PkgError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| PkgError::registry(format!("Invalid registry URL '{base_url}': {e}")))?;

        // Without a trailing slash `join` would replace the last path segment.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("flight/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PkgError::registry(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { base_url, http })
    }

    /// Create a client using the registry URL from environment or default.
    ///
    /// # Errors
    /// Returns an error if the client cannot be created.
    pub fn from_env() -> Result<Self, PkgError> {
        let url = std::env::var(REGISTRY_ENV).unwrap_or_else(|_| DEFAULT_REGISTRY.to_string());
        Self::new(&url)
    }

    /// Get the base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of the packument document for `name`.
    ///
    /// # Errors
    /// Returns an error if the escaped name does not form a valid URL.
    pub fn packument_url(&self, name: &str) -> Result<Url, PkgError> {
        self.base_url
            .join(&escape_name(name))
            .map_err(|e| PkgError::registry(format!("Failed to build URL for '{name}': {e}")))
    }
}

impl PackumentSource for RegistryClient {
    async fn fetch_packument(&self, name: &str) -> Result<Packument, PkgError> {
        let url = self.packument_url(name)?;
        tracing::trace!(package = name, url = %url, "fetching packument");

        let response = self.http.get(url.as_str()).send().await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PkgError::not_found(name));
        }

        if !response.status().is_success() {
            return Err(PkgError::registry(format!(
                "Registry returned status {} for '{name}'",
                response.status()
            )));
        }

        let mut packument: Packument = response.json().await?;
        if packument.name.is_empty() {
            packument.name = name.to_string();
        }
        Ok(packument)
    }
}

/// A registry fetch that failed, tagged with the package it was for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub name: String,
    pub error: PkgError,
}

/// Caching front for a [`PackumentSource`].
///
/// Entries are keyed by the escaped package name and never change once
/// stored, so every caller sees the same `Arc<Packument>` for a name.
#[derive(Debug)]
pub struct Registry<S> {
    source: S,
    cache: RwLock<HashMap<String, Arc<Packument>>>,
    fetched: AtomicUsize,
}

impl<S: PackumentSource> Registry<S> {
    #[must_use]
    pub fn new(source: S) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
            fetched: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch a packument, serving repeats from the cache.
    pub async fn fetch(&self, name: &str) -> Result<Arc<Packument>, FetchFailure> {
        let key = escape_name(name);

        if let Some(hit) = self.cache.read().await.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let packument = self
            .source
            .fetch_packument(name)
            .await
            .map_err(|error| FetchFailure {
                name: name.to_string(),
                error,
            })?;
        self.fetched.fetch_add(1, Ordering::Relaxed);

        // Two concurrent misses may both fetch; the first insert wins.
        let mut cache = self.cache.write().await;
        let entry = cache.entry(key).or_insert_with(|| Arc::new(packument));
        Ok(Arc::clone(entry))
    }

    /// Fetch several packuments concurrently. Fails with the first failure.
    pub async fn batch_fetch<'a, I>(&self, names: I) -> Result<Vec<Arc<Packument>>, FetchFailure>
    where
        I: IntoIterator<Item = &'a str>,
    {
        try_join_all(names.into_iter().map(|name| self.fetch(name))).await
    }

    /// Look up an already fetched packument.
    pub async fn cached(&self, name: &str) -> Option<Arc<Packument>> {
        self.cache.read().await.get(&escape_name(name)).cloned()
    }

    /// Number of packuments actually requested from the source.
    #[must_use]
    pub fn fetched_count(&self) -> usize {
        self.fetched.load(Ordering::Relaxed)
    }
}
