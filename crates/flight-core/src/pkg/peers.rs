//! Peer dependency validation.
//!
//! Peers are only checked for root packages: every peer a root declares must
//! itself be a root, installed at a version inside the declared range.

use super::graph::DependencyGraph;
use super::lockfile::PeerMap;
use super::version::version_satisfies;

/// Findings of a peer validation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerReport {
    /// peer -> (consumer full name -> range). Fatal when non-empty.
    pub missing: PeerMap,
    /// consumer full name -> (peer -> range). Warnings only.
    pub invalid: PeerMap,
}

impl PeerReport {
    #[must_use]
    pub fn has_missing(&self) -> bool {
        !self.missing.is_empty()
    }
}

/// Check requested peers (consumer full name -> peer -> range) against the
/// root packages of `graph`.
#[must_use]
pub fn validate_peers(
    graph: &DependencyGraph,
    requested: &PeerMap,
    include_prerelease: bool,
) -> PeerReport {
    let mut report = PeerReport::default();

    for (consumer, peers) in requested {
        for (peer, range) in peers {
            let installed = graph
                .resolution(peer)
                .filter(|_| graph.is_root_package(peer));

            match installed {
                None => {
                    tracing::debug!(consumer = %consumer, peer = %peer, range = %range, "missing peer");
                    report
                        .missing
                        .entry(peer.clone())
                        .or_default()
                        .insert(consumer.clone(), range.clone());
                }
                Some(res) if !version_satisfies(&res.version, range, include_prerelease) => {
                    tracing::warn!(
                        consumer = %consumer,
                        peer = %peer,
                        range = %range,
                        installed = %res.version,
                        "peer dependency not satisfied"
                    );
                    report
                        .invalid
                        .entry(consumer.clone())
                        .or_default()
                        .insert(peer.clone(), range.clone());
                }
                Some(_) => {}
            }
        }
    }

    report
}
