//! Test helpers: packument builders and an in-memory packument source.

use super::error::PkgError;
use super::registry::{Dist, Packument, PackumentSource, PackumentVersion};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// Build a packument publishing `versions`, each depending on `deps`.
///
/// The last version is tagged `latest`.
pub fn packument(name: &str, versions: &[&str], deps: &[(&str, &str)]) -> Packument {
    let mut p = Packument {
        name: name.to_string(),
        ..Packument::default()
    };
    for v in versions {
        let manifest = PackumentVersion {
            version: Some((*v).to_string()),
            dependencies: pairs(deps),
            dist: Some(Dist {
                tarball: Some(format!("https://registry.test/{name}/-/{v}.tgz")),
                integrity: Some(format!("sha512-{name}-{v}")),
                shasum: None,
            }),
            ..PackumentVersion::default()
        };
        p.versions.insert((*v).to_string(), manifest);
    }
    if let Some(last) = versions.last() {
        p.dist_tags.insert("latest".into(), (*last).to_string());
    }
    p
}

/// Replace the dependencies of one version.
pub fn with_deps(mut p: Packument, version: &str, deps: &[(&str, &str)]) -> Packument {
    if let Some(v) = p.versions.get_mut(version) {
        v.dependencies = pairs(deps);
    }
    p
}

/// Replace the peer dependencies of one version.
pub fn with_peers(mut p: Packument, version: &str, peers: &[(&str, &str)]) -> Packument {
    if let Some(v) = p.versions.get_mut(version) {
        v.peer_dependencies = pairs(peers);
    }
    p
}

fn pairs(entries: &[(&str, &str)]) -> std::collections::BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

/// Packument source backed by a map, counting requests per name.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    packuments: HashMap<String, Packument>,
    hanging: HashSet<String>,
    delay: Option<Duration>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, packument: Packument) -> Self {
        self.packuments.insert(packument.name.clone(), packument);
        self
    }

    /// Requests for `name` never complete.
    pub fn hanging(mut self, name: &str) -> Self {
        self.hanging.insert(name.to_string());
        self
    }

    /// Every request sleeps before answering.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn request_count(&self, name: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    pub fn total_requests(&self) -> usize {
        self.requests.lock().unwrap().values().sum()
    }
}

impl PackumentSource for MemoryRegistry {
    async fn fetch_packument(&self, name: &str) -> Result<Packument, PkgError> {
        *self
            .requests
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default() += 1;

        if self.hanging.contains(name) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.packuments
            .get(name)
            .cloned()
            .ok_or_else(|| PkgError::not_found(name))
    }
}
