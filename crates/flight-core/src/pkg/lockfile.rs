//! Lockfile ("jpack") document produced by the resolver.
//!
//! The lockfile records the exact version chosen for every package in the
//! dependency tree so the fetch stage can install without resolving again.
//!
//! ## File Format
//!
//! `flight.lock` is pretty-printed, tab-indented JSON:
//!
//! ```json
//! {
//! 	"appDependencies": { "pkg-a": { "version": "1.2.0", "dependencies": { "pkg-b": "pkg-b@2.1.0" } } },
//! 	"resDependencies": { "pkg-b@2.1.0": { "version": "2.1.0" } },
//! 	"warnings": { "invalidPeers": {}, "missingPeers": {}, "requestedPeers": {} }
//! }
//! ```

use super::error::{codes, PkgError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

/// Lockfile filename.
pub const LOCKFILE_NAME: &str = "flight.lock";

/// `consumer -> (peer -> range)` or `peer -> (consumer -> range)` maps.
pub type PeerMap = BTreeMap<String, BTreeMap<String, String>>;

/// Descriptive package.json fields copied verbatim from the registry into
/// lockfile entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typings: Option<Value>,
    #[serde(rename = "js:next", default, skip_serializing_if = "Option::is_none")]
    pub js_next: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unpkg: Option<Value>,
}

/// One resolved package in the lockfile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedEntry {
    /// Concrete version.
    pub version: String,
    /// Dependency name -> full name (`name@version`) it resolved to.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,
    /// Tarball URL published by the registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved: Option<String>,
    /// Subresource integrity (or legacy shasum).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub integrity: Option<String>,
    #[serde(flatten)]
    pub fields: EntryFields,
}

impl ResolvedEntry {
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }
}

/// Non-fatal findings of a resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Warnings {
    /// consumer full name -> (peer -> requested range) for violated ranges.
    #[serde(default)]
    pub invalid_peers: PeerMap,
    /// peer -> (consumer full name -> requested range).
    #[serde(default)]
    pub missing_peers: PeerMap,
    /// consumer full name -> declared peer ranges, for root packages.
    #[serde(default)]
    pub requested_peers: PeerMap,
}

/// The complete lockfile document.
///
/// `BTreeMap`s keep serialization deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lockfile {
    /// Root packages by name.
    #[serde(default)]
    pub app_dependencies: BTreeMap<String, ResolvedEntry>,
    /// Transitive packages by full name (`name@version`).
    #[serde(default)]
    pub res_dependencies: BTreeMap<String, ResolvedEntry>,
    #[serde(default)]
    pub warnings: Warnings,
}

impl Lockfile {
    /// Get the full-name key for a name and version.
    #[must_use]
    pub fn package_key(name: &str, version: &str) -> String {
        format!("{name}@{version}")
    }

    /// Every `(name, version)` the fetch stage has to install, roots first.
    pub fn packages(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        let roots = self
            .app_dependencies
            .iter()
            .map(|(name, entry)| (name.as_str(), entry.version.as_str()));
        let transitive = self
            .res_dependencies
            .keys()
            .filter_map(|key| split_full_name(key));
        roots.chain(transitive)
    }

    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.app_dependencies.is_empty() && self.res_dependencies.is_empty()
    }

    /// Serialize as tab-indented JSON with a trailing newline.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, PkgError> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser).map_err(|e| {
            PkgError::new(
                codes::PKG_LOCK_WRITE_FAILED,
                format!("Failed to serialize lockfile: {e}"),
            )
        })?;
        buf.push(b'\n');
        String::from_utf8(buf).map_err(|e| {
            PkgError::new(
                codes::PKG_LOCK_WRITE_FAILED,
                format!("Lockfile is not UTF-8: {e}"),
            )
        })
    }

    /// Read a lockfile from a path.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn read_from(path: &Path) -> Result<Self, PkgError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                PkgError::new(
                    codes::PKG_LOCK_NOT_FOUND,
                    format!("Lockfile not found: {}", path.display()),
                )
            } else {
                PkgError::new(
                    codes::PKG_LOCK_INVALID_JSON,
                    format!("Failed to read lockfile: {e}"),
                )
            }
        })?;

        serde_json::from_str(&content).map_err(|e| {
            PkgError::new(
                codes::PKG_LOCK_INVALID_JSON,
                format!("Invalid lockfile JSON: {e}"),
            )
        })
    }

    /// Write the lockfile to a path atomically.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn write_to(&self, path: &Path) -> Result<(), PkgError> {
        let content = self.to_json()?;
        flight_util::fs::atomic_write(path, content.as_bytes()).map_err(|e| {
            PkgError::new(
                codes::PKG_LOCK_WRITE_FAILED,
                format!("Failed to write lockfile: {e}"),
            )
        })
    }
}

/// Split `name@version` on the last `@`, keeping a scope's leading `@`.
#[must_use]
pub fn split_full_name(full: &str) -> Option<(&str, &str)> {
    match full.rfind('@') {
        Some(at) if at > 0 => Some((&full[..at], &full[at + 1..])),
        _ => None,
    }
}
