//! Lockfile rendering.
//!
//! A pure projection of a finished [`DependencyGraph`] into a [`Lockfile`].

use super::graph::{DependencyGraph, NodeId};
use super::lockfile::{Lockfile, ResolvedEntry, Warnings};

/// Render the graph. Root packages go to `appDependencies`, everything
/// reachable from them to `resDependencies`, each full name once.
#[must_use]
pub fn render_lockfile(graph: &DependencyGraph, warnings: Warnings) -> Lockfile {
    let mut lock = Lockfile {
        warnings,
        ..Lockfile::default()
    };
    let mut pending: Vec<NodeId> = Vec::new();

    for name in graph.root_names() {
        let Some(res) = graph.resolution(name) else {
            continue;
        };
        let entry = render_entry(graph, &res.pinned, &mut pending);
        lock.app_dependencies.insert(name.to_string(), entry);
    }

    while let Some(id) = pending.pop() {
        let key = id.to_string();
        if lock.res_dependencies.contains_key(&key) {
            continue;
        }
        let entry = render_entry(graph, &id, &mut pending);
        lock.res_dependencies.insert(key, entry);
    }

    lock
}

fn render_entry(graph: &DependencyGraph, id: &NodeId, pending: &mut Vec<NodeId>) -> ResolvedEntry {
    let mut entry = ResolvedEntry::new(id.version().unwrap_or_default());

    if let Some(manifest) = graph.node(id).and_then(|node| node.manifest.as_deref()) {
        entry.fields = manifest.fields.clone();
        if let Some(dist) = &manifest.dist {
            entry.resolved.clone_from(&dist.tarball);
            entry.integrity = dist.integrity.clone().or_else(|| dist.shasum.clone());
        }
    }

    // Bare references sort before pinned successors, so a concrete edge of
    // the same name overwrites the peer reference.
    for succ in graph.successors(id) {
        match succ {
            NodeId::Bare(name) => {
                if let Some(res) = graph.resolution(name) {
                    entry
                        .dependencies
                        .insert(name.clone(), res.pinned.to_string());
                }
            }
            NodeId::Pinned { name, .. } => {
                entry.dependencies.insert(name.clone(), succ.to_string());
                pending.push(succ.clone());
            }
            NodeId::Root => {}
        }
    }

    entry
}
