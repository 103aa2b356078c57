//! Package manager functionality.
//!
//! Provides utilities for:
//! - Parsing package specifications (name@version)
//! - Reading root dependencies from package.json
//! - Fetching and caching packuments from an npm-compatible registry
//! - Resolving version ranges using semver
//! - Building the dependency graph and validating peer dependencies
//! - Rendering and writing the `flight.lock` lockfile

pub mod deps;
pub mod error;
pub mod graph;
pub mod lockfile;
pub mod peers;
pub mod queue;
pub mod registry;
pub mod render;
pub mod resolve;
pub mod spec;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;

pub use deps::{read_package_deps, PackageDeps, PkgDepError};
pub use error::{codes as pkg_codes, PkgError};
pub use graph::{DependencyGraph, GraphError, GraphNode, NodeId};
pub use lockfile::{
    split_full_name, EntryFields, Lockfile, PeerMap, ResolvedEntry, Warnings, LOCKFILE_NAME,
};
pub use peers::{validate_peers, PeerReport};
pub use registry::{
    Packument, PackumentSource, PackumentVersion, Registry, RegistryClient, DEFAULT_REGISTRY,
    REGISTRY_ENV,
};
pub use render::render_lockfile;
pub use resolve::{
    Phase, ResolutionError, ResolveOutcome, Resolver, ResolverOptions, DEFAULT_TIMEOUT,
    MAX_CONCURRENT_FETCHES,
};
pub use spec::PackageSpec;
pub use version::{resolve_version, version_satisfies, RangeSet};
