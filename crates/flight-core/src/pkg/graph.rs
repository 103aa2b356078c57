//! In-memory dependency graph built during resolution.
//!
//! Nodes are identified by [`NodeId`]:
//! - `Root`: synthetic consumer of every root package
//! - `Bare(name)`: a root package by name, carrying the version it resolved to
//! - `Pinned { name, version }`: one concrete `name@version`, carrying its manifest
//!
//! Edges point from consumer to dependency. A pinned node with a `Bare`
//! successor references whatever version the root of that name resolved to
//! (used for peer dependencies of root packages).

use super::registry::PackumentVersion;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

/// Graph node identity.
///
/// The derived ordering is `Root < Bare < Pinned`, then by name, then by
/// version string.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NodeId {
    Root,
    Bare(String),
    Pinned { name: String, version: String },
}

impl NodeId {
    #[must_use]
    pub fn bare(name: impl Into<String>) -> Self {
        Self::Bare(name.into())
    }

    #[must_use]
    pub fn pinned(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self::Pinned {
            name: name.into(),
            version: version.into(),
        }
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        matches!(self, Self::Root)
    }

    /// Package name, `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Root => None,
            Self::Bare(name) | Self::Pinned { name, .. } => Some(name),
        }
    }

    /// Concrete version of a pinned node.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Pinned { version, .. } => Some(version),
            _ => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("<root>"),
            Self::Bare(name) => f.write_str(name),
            Self::Pinned { name, version } => write!(f, "{name}@{version}"),
        }
    }
}

/// Graph invariant violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("edge {from} -> {to}: target node does not exist")]
    MissingTarget { from: NodeId, to: NodeId },
    #[error("edge {from} -> {to}: source node does not exist")]
    MissingSource { from: NodeId, to: NodeId },
    #[error("node {0} does not exist")]
    MissingNode(NodeId),
}

/// Version a root package resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub version: String,
    pub pinned: NodeId,
}

/// Attributes of one node.
#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    /// Set on `Bare` nodes once the root package resolved.
    pub resolution: Option<Resolution>,
    /// Set on `Pinned` nodes.
    pub manifest: Option<Arc<PackumentVersion>>,
    expanded: bool,
    successors: BTreeSet<NodeId>,
}

/// Directed dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl DependencyGraph {
    /// Create a graph holding only the root node.
    #[must_use]
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::Root, GraphNode::default());
        Self { nodes }
    }

    /// Insert a node if absent.
    pub fn ensure_node(&mut self, id: NodeId) -> &mut GraphNode {
        self.nodes.entry(id).or_default()
    }

    #[must_use]
    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    /// Add an edge between two existing nodes. Adding it twice is a no-op.
    pub fn set_edge(&mut self, from: &NodeId, to: &NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(to) {
            return Err(GraphError::MissingTarget {
                from: from.clone(),
                to: to.clone(),
            });
        }
        let Some(node) = self.nodes.get_mut(from) else {
            return Err(GraphError::MissingSource {
                from: from.clone(),
                to: to.clone(),
            });
        };
        node.successors.insert(to.clone());
        Ok(())
    }

    /// Successors of a node in `NodeId` order.
    pub fn successors(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> + '_ {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(|node| node.successors.iter())
    }

    /// Record the version a root package resolved to.
    pub fn set_resolution(
        &mut self,
        bare: &NodeId,
        version: impl Into<String>,
        pinned: NodeId,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(bare)
            .ok_or_else(|| GraphError::MissingNode(bare.clone()))?;
        node.resolution = Some(Resolution {
            version: version.into(),
            pinned,
        });
        Ok(())
    }

    /// Attach a manifest to a pinned node. The first manifest sticks.
    pub fn set_manifest(
        &mut self,
        pinned: &NodeId,
        manifest: Arc<PackumentVersion>,
    ) -> Result<(), GraphError> {
        let node = self
            .nodes
            .get_mut(pinned)
            .ok_or_else(|| GraphError::MissingNode(pinned.clone()))?;
        node.manifest.get_or_insert(manifest);
        Ok(())
    }

    /// Mark a node as expanded. Returns `true` only for the first caller.
    pub fn claim_expansion(&mut self, pinned: &NodeId) -> bool {
        match self.nodes.get_mut(pinned) {
            Some(node) if !node.expanded => {
                node.expanded = true;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn is_expanded(&self, id: &NodeId) -> bool {
        self.nodes.get(id).is_some_and(|node| node.expanded)
    }

    /// Names of the root packages, sorted.
    pub fn root_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.successors(&NodeId::Root).filter_map(|id| match id {
            NodeId::Bare(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Whether `name` is a root package.
    #[must_use]
    pub fn is_root_package(&self, name: &str) -> bool {
        self.nodes
            .get(&NodeId::Root)
            .is_some_and(|root| root.successors.contains(&NodeId::bare(name)))
    }

    /// What the root package `name` resolved to.
    #[must_use]
    pub fn resolution(&self, name: &str) -> Option<&Resolution> {
        self.nodes
            .get(&NodeId::bare(name))
            .and_then(|node| node.resolution.as_ref())
    }

    /// Number of distinct `name@version` nodes.
    #[must_use]
    pub fn pinned_count(&self) -> usize {
        self.nodes
            .keys()
            .filter(|id| matches!(id, NodeId::Pinned { .. }))
            .count()
    }
}
