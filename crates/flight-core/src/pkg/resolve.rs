//! Dependency resolution.
//!
//! [`Resolver::resolve`] turns a map of root specifiers into a [`Lockfile`].
//! A single coordinator owns the dependency graph, the requested peers and
//! the error latch; the futures it polls only fetch packuments. Graph writes
//! therefore never interleave, and each `name@version` is expanded once.
//!
//! A resolution moves through [`Phase`]s:
//!
//! ```text
//! Seeding -> Running -> (Failed | Drained) -> ValidatingPeers -> (Failed | Rendering) -> Done
//! ```

use super::error::{codes, PkgError};
use super::graph::{DependencyGraph, GraphError, NodeId};
use super::lockfile::{Lockfile, PeerMap, Warnings};
use super::peers::validate_peers;
use super::queue::{Abort, Dispatch, Event, WorkQueue};
use super::registry::{FetchFailure, Packument, PackumentSource, Registry};
use super::render::render_lockfile;
use super::version::resolve_version;
use futures::future::{FutureExt, LocalBoxFuture};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default time budget for one resolution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum concurrent packument fetches.
pub const MAX_CONCURRENT_FETCHES: usize = 32;

/// Options for dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Time budget, measured from the start of `resolve()`.
    pub timeout: Duration,
    /// Worker slots for registry fetches.
    pub concurrency: usize,
    /// Reject on missing peers and report invalid ones.
    pub validate_peers: bool,
    /// Let ranges match pre-release versions.
    pub include_prerelease: bool,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            concurrency: MAX_CONCURRENT_FETCHES,
            validate_peers: true,
            include_prerelease: true,
        }
    }
}

impl ResolverOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_peer_validation(mut self, validate: bool) -> Self {
        self.validate_peers = validate;
        self
    }

    #[must_use]
    pub fn with_prerelease(mut self, include: bool) -> Self {
        self.include_prerelease = include;
        self
    }
}

/// Result of a successful resolution.
#[derive(Debug, Clone)]
pub struct ResolveOutcome {
    /// The generated lockfile.
    pub lockfile: Lockfile,
    /// Distinct `name@version` identities resolved.
    pub resolved_count: usize,
    /// Packuments fetched from the registry.
    pub fetched_count: usize,
}

/// Why a resolution was rejected. Only the first error of a run is kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionError {
    #[error("package not found: {0}")]
    PackageNotFound(String),
    #[error("no manifest published for {0}")]
    MissingVersion(String),
    #[error("no version of {name} satisfies '{range}'")]
    UnsatisfiedRange { name: String, range: String },
    #[error("resolution timed out")]
    Timeout,
    #[error("missing peer dependencies: {}", .0.keys().cloned().collect::<Vec<_>>().join(", "))]
    MissingPeers(PeerMap),
    /// A graph invariant was violated. Indicates a resolver bug.
    #[error("internal resolver error: {0}")]
    Internal(String),
}

impl ResolutionError {
    /// Stable machine-readable kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::PackageNotFound(_) => "PACKAGE_NOT_FOUND",
            Self::MissingVersion(_) => "MISSING_VERSION",
            Self::UnsatisfiedRange { .. } => "UNSATISFIED_RANGE",
            Self::Timeout => "TIMEOUT",
            Self::MissingPeers(_) => "MISSING_PEERS",
            Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<GraphError> for ResolutionError {
    fn from(e: GraphError) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Resolver phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Seeding,
    Running,
    Drained,
    ValidatingPeers,
    Rendering,
    Failed,
    Done,
}

/// One `(name, range)` request made by `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub name: String,
    pub range: String,
    pub parent: NodeId,
}

#[derive(Debug)]
enum Work {
    Resolve(Task),
    /// Prefetch the children of an expanded node, then queue them.
    Expand {
        parent: NodeId,
        children: BTreeMap<String, String>,
    },
}

enum Completion {
    Resolved {
        task: Task,
        result: Result<Arc<Packument>, FetchFailure>,
    },
    Expanded {
        parent: NodeId,
        children: BTreeMap<String, String>,
        result: Result<(), FetchFailure>,
    },
}

/// State owned by the coordinator for one `resolve()` call.
struct Session {
    graph: DependencyGraph,
    requested_peers: PeerMap,
    invalid_peers: PeerMap,
    error: Option<ResolutionError>,
    include_prerelease: bool,
}

impl Session {
    fn new(include_prerelease: bool) -> Self {
        Self {
            graph: DependencyGraph::new(),
            requested_peers: PeerMap::new(),
            invalid_peers: PeerMap::new(),
            error: None,
            include_prerelease,
        }
    }

    /// Keep the first error; later ones are dropped.
    fn latch(&mut self, error: ResolutionError) {
        if self.error.is_none() {
            tracing::debug!(kind = error.code(), error = %error, "resolution error latched");
            self.error = Some(error);
        } else {
            tracing::trace!(kind = error.code(), "ignoring error after latch");
        }
    }

    fn is_latched(&self) -> bool {
        self.error.is_some()
    }

    fn apply(&mut self, completion: Completion) -> Vec<Work> {
        match completion {
            Completion::Resolved {
                task,
                result: Ok(packument),
            } => match self.apply_task(task, &packument) {
                Ok(work) => work.into_iter().collect(),
                Err(e) => {
                    self.latch(e.into());
                    Vec::new()
                }
            },
            Completion::Expanded {
                parent,
                children,
                result: Ok(()),
            } => children
                .into_iter()
                .map(|(name, range)| {
                    Work::Resolve(Task {
                        name,
                        range,
                        parent: parent.clone(),
                    })
                })
                .collect(),
            Completion::Resolved {
                result: Err(failure),
                ..
            }
            | Completion::Expanded {
                result: Err(failure),
                ..
            } => {
                self.fetch_failed(failure);
                Vec::new()
            }
        }
    }

    fn fetch_failed(&mut self, failure: FetchFailure) {
        // Cancellation only follows an already latched timeout.
        if failure.error.code() == codes::PKG_FETCH_CANCELLED {
            return;
        }
        tracing::warn!(package = %failure.name, error = %failure.error, "registry fetch failed");
        self.latch(ResolutionError::PackageNotFound(failure.name));
    }

    /// Resolve one task against its packument and record it in the graph.
    ///
    /// Returns the expansion of the resolved identity when this is the first
    /// time it was reached.
    fn apply_task(&mut self, task: Task, packument: &Packument) -> Result<Option<Work>, GraphError> {
        let Some(version) = resolve_version(&task.range, packument, self.include_prerelease) else {
            self.latch(ResolutionError::UnsatisfiedRange {
                name: task.name,
                range: task.range,
            });
            return Ok(None);
        };

        let full = NodeId::pinned(task.name.as_str(), version.as_str());
        let Some(manifest) = packument.versions.get(&version) else {
            self.latch(ResolutionError::MissingVersion(full.to_string()));
            return Ok(None);
        };

        tracing::trace!(
            package = %task.name,
            range = %task.range,
            version = %version,
            parent = %task.parent,
            "resolved"
        );

        if !self.graph.contains(&full) {
            self.graph.ensure_node(full.clone());
            self.graph.set_manifest(&full, Arc::new(manifest.clone()))?;
        }

        if task.parent.is_root() {
            let bare = NodeId::bare(task.name.as_str());
            self.graph.ensure_node(bare.clone());
            self.graph.set_resolution(&bare, version.as_str(), full.clone())?;
            self.graph.set_edge(&NodeId::Root, &bare)?;

            if !manifest.peer_dependencies.is_empty() {
                self.requested_peers
                    .insert(full.to_string(), manifest.peer_dependencies.clone());
                for peer in manifest.peer_dependencies.keys() {
                    let peer = NodeId::bare(peer.as_str());
                    self.graph.ensure_node(peer.clone());
                    self.graph.set_edge(&full, &peer)?;
                }
            }
        } else {
            self.graph.set_edge(&task.parent, &full)?;
        }

        if !self.graph.claim_expansion(&full) {
            return Ok(None);
        }

        let children = manifest.expansion_set();
        if children.is_empty() {
            return Ok(None);
        }
        Ok(Some(Work::Expand {
            parent: full,
            children,
        }))
    }
}

/// Turn a work item into a fetch future that gives up once `token` is raised.
fn start_work<'a, R>(
    registry: &'a Registry<R>,
    token: CancellationToken,
    work: Work,
) -> LocalBoxFuture<'a, Completion>
where
    R: PackumentSource + 'a,
{
    match work {
        Work::Resolve(task) => async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(FetchFailure {
                    name: task.name.clone(),
                    error: PkgError::cancelled(&task.name),
                }),
                fetched = registry.fetch(&task.name) => fetched,
            };
            Completion::Resolved { task, result }
        }
        .boxed_local(),
        Work::Expand { parent, children } => async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(FetchFailure {
                    name: parent.to_string(),
                    error: PkgError::cancelled(&parent.to_string()),
                }),
                fetched = registry.batch_fetch(children.keys().map(String::as_str)) => {
                    fetched.map(|_| ())
                }
            };
            Completion::Expanded {
                parent,
                children,
                result,
            }
        }
        .boxed_local(),
    }
}

/// Dependency resolver over a packument source.
#[derive(Debug)]
pub struct Resolver<S> {
    source: S,
    options: ResolverOptions,
}

impl<S: PackumentSource> Resolver<S> {
    #[must_use]
    pub fn new(source: S, options: ResolverOptions) -> Self {
        Self { source, options }
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve `roots` (name -> version spec) into a lockfile.
    ///
    /// Every call starts from an empty graph and packument cache.
    ///
    /// # Errors
    /// Returns the first [`ResolutionError`] encountered.
    pub async fn resolve(
        &self,
        roots: &BTreeMap<String, String>,
    ) -> Result<ResolveOutcome, ResolutionError> {
        let registry = Registry::new(&self.source);
        let mut queue: WorkQueue<'_, Work, Completion> =
            WorkQueue::new(self.options.concurrency, self.options.timeout);
        let mut session = Session::new(self.options.include_prerelease);
        let mut lockfile = Lockfile::default();
        let mut phase = Phase::Seeding;

        loop {
            tracing::debug!(
                ?phase,
                elapsed_ms = queue.elapsed().as_millis() as u64,
                "resolver phase"
            );

            phase = match phase {
                Phase::Seeding => Self::seed(roots, &registry, &mut queue, &mut session).await,
                Phase::Running => {
                    Self::run(&registry, &mut queue, &mut session).await;
                    if session.is_latched() {
                        Phase::Failed
                    } else {
                        Phase::Drained
                    }
                }
                Phase::Drained => {
                    if self.options.validate_peers {
                        Phase::ValidatingPeers
                    } else {
                        Phase::Rendering
                    }
                }
                Phase::ValidatingPeers => {
                    let report = validate_peers(
                        &session.graph,
                        &session.requested_peers,
                        self.options.include_prerelease,
                    );
                    session.invalid_peers = report.invalid;
                    if report.missing.is_empty() {
                        Phase::Rendering
                    } else {
                        session.latch(ResolutionError::MissingPeers(report.missing));
                        Phase::Failed
                    }
                }
                Phase::Rendering => {
                    let warnings = Warnings {
                        invalid_peers: std::mem::take(&mut session.invalid_peers),
                        missing_peers: PeerMap::new(),
                        requested_peers: session.requested_peers.clone(),
                    };
                    lockfile = render_lockfile(&session.graph, warnings);
                    Phase::Done
                }
                Phase::Failed => {
                    let error = session.error.take().unwrap_or_else(|| {
                        ResolutionError::Internal("resolution failed without an error".into())
                    });
                    tracing::debug!(kind = error.code(), "resolution rejected");
                    return Err(error);
                }
                Phase::Done => {
                    let outcome = ResolveOutcome {
                        lockfile,
                        resolved_count: session.graph.pinned_count(),
                        fetched_count: registry.fetched_count(),
                    };
                    tracing::info!(
                        roots = roots.len(),
                        resolved = outcome.resolved_count,
                        fetched = outcome.fetched_count,
                        elapsed_ms = queue.elapsed().as_millis() as u64,
                        "resolution complete"
                    );
                    return Ok(outcome);
                }
            };
        }
    }

    /// Prefetch every root packument once, then queue the root tasks.
    async fn seed<'a>(
        roots: &BTreeMap<String, String>,
        registry: &'a Registry<&S>,
        queue: &mut WorkQueue<'a, Work, Completion>,
        session: &mut Session,
    ) -> Phase {
        if roots.is_empty() {
            tracing::debug!("no root dependencies");
            return Phase::Done;
        }

        let prefetch = registry.batch_fetch(roots.keys().map(String::as_str));
        match tokio::time::timeout_at(queue.deadline(), prefetch).await {
            Err(_) => {
                session.latch(ResolutionError::Timeout);
                queue.cancel();
                return Phase::Failed;
            }
            Ok(Err(failure)) => {
                session.fetch_failed(failure);
                return Phase::Failed;
            }
            Ok(Ok(_)) => {}
        }

        for (name, range) in roots {
            queue.push(Work::Resolve(Task {
                name: name.clone(),
                range: range.clone(),
                parent: NodeId::Root,
            }));
        }
        Phase::Running
    }

    /// Dispatch and apply work until the queue drains.
    async fn run<'a>(
        registry: &'a Registry<&S>,
        queue: &mut WorkQueue<'a, Work, Completion>,
        session: &mut Session,
    ) {
        loop {
            loop {
                match queue.dispatch(session.is_latched()) {
                    Dispatch::Run(work) => {
                        let token = queue.token();
                        queue.spawn(start_work(registry, token, work));
                    }
                    Dispatch::Discarded(work, Abort::Deadline) => {
                        tracing::trace!(?work, "discarded after deadline");
                        trip_deadline(queue, session);
                    }
                    Dispatch::Discarded(_, Abort::Latched) => {}
                    Dispatch::Idle => break,
                }
            }

            match queue.next_event().await {
                None => break,
                Some(Event::Deadline) => trip_deadline(queue, session),
                Some(Event::Completed(completion)) => {
                    for work in session.apply(completion) {
                        queue.push(work);
                    }
                }
            }
        }

        debug_assert!(queue.is_drained());
    }
}

fn trip_deadline(queue: &WorkQueue<'_, Work, Completion>, session: &mut Session) {
    if queue.is_cancelled() {
        return;
    }
    tracing::warn!(
        elapsed_ms = queue.elapsed().as_millis() as u64,
        in_flight = queue.in_flight(),
        "resolution deadline exceeded"
    );
    session.latch(ResolutionError::Timeout);
    queue.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pkg::testing::{packument, with_deps, with_peers, MemoryRegistry};
    use std::time::Instant;

    fn roots(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn resolver(source: MemoryRegistry) -> Resolver<MemoryRegistry> {
        Resolver::new(source, ResolverOptions::default())
    }

    #[tokio::test]
    async fn test_wildcard_resolves_latest() {
        let source = MemoryRegistry::new().with(packument("left-pad", &["1.0.0", "1.3.0"], &[]));
        let resolver = resolver(source);

        for spec in ["*", ""] {
            let outcome = resolver.resolve(&roots(&[("left-pad", spec)])).await.unwrap();
            assert_eq!(outcome.lockfile.app_dependencies["left-pad"].version, "1.3.0");
            assert!(outcome.lockfile.res_dependencies.is_empty());
        }
    }

    #[tokio::test]
    async fn test_transitive_dependency() {
        let pkg_a = with_deps(
            packument("pkg-a", &["1.0.0", "1.2.0"], &[]),
            "1.2.0",
            &[("pkg-b", "^2.0.0")],
        );
        let pkg_b = packument("pkg-b", &["1.0.0", "2.0.0", "2.1.0", "3.0.0"], &[]);
        let resolver = resolver(MemoryRegistry::new().with(pkg_a).with(pkg_b));

        let outcome = resolver.resolve(&roots(&[("pkg-a", "^1.0.0")])).await.unwrap();
        let lock = &outcome.lockfile;

        assert_eq!(lock.app_dependencies.keys().collect::<Vec<_>>(), vec!["pkg-a"]);
        let a = &lock.app_dependencies["pkg-a"];
        assert_eq!(a.version, "1.2.0");
        assert_eq!(a.dependencies["pkg-b"], "pkg-b@2.1.0");
        assert_eq!(lock.res_dependencies["pkg-b@2.1.0"].version, "2.1.0");
        assert_eq!(
            a.resolved.as_deref(),
            Some("https://registry.test/pkg-a/-/1.2.0.tgz")
        );
        assert_eq!(outcome.resolved_count, 2);
        assert_eq!(outcome.fetched_count, 2);
    }

    #[tokio::test]
    async fn test_shared_dependency_deduplicated() {
        let source = MemoryRegistry::new()
            .with(packument("a", &["1.0.0"], &[("shared", "^1.0.0")]))
            .with(packument("b", &["1.0.0"], &[("shared", "~1.2.0")]))
            .with(packument("shared", &["1.1.0", "1.2.3"], &[]));
        let resolver = resolver(source);

        let outcome = resolver
            .resolve(&roots(&[("a", "*"), ("b", "*")]))
            .await
            .unwrap();
        let lock = &outcome.lockfile;

        assert_eq!(lock.res_dependencies.len(), 1);
        assert_eq!(lock.app_dependencies["a"].dependencies["shared"], "shared@1.2.3");
        assert_eq!(lock.app_dependencies["b"].dependencies["shared"], "shared@1.2.3");
        assert_eq!(resolver.source().request_count("shared"), 1);
    }

    #[tokio::test]
    async fn test_diamond_expands_once() {
        let source = MemoryRegistry::new()
            .with(packument("a", &["1.0.0"], &[("c", "^1.0.0")]))
            .with(packument("b", &["1.0.0"], &[("c", "^1.0.0")]))
            .with(packument("c", &["1.0.0"], &[("d", "*")]))
            .with(packument("d", &["1.0.0"], &[]));
        let resolver = resolver(source);

        let outcome = resolver
            .resolve(&roots(&[("a", "*"), ("b", "*")]))
            .await
            .unwrap();

        assert_eq!(outcome.resolved_count, 4);
        assert_eq!(resolver.source().request_count("d"), 1);
        assert_eq!(
            outcome.lockfile.res_dependencies["c@1.0.0"].dependencies["d"],
            "d@1.0.0"
        );
    }

    #[tokio::test]
    async fn test_cycle_terminates() {
        let source = MemoryRegistry::new()
            .with(packument("a", &["1.0.0"], &[("b", "^1.0.0")]))
            .with(packument("b", &["1.0.0"], &[("a", "^1.0.0")]));
        let resolver = resolver(source);

        let outcome = resolver.resolve(&roots(&[("a", "*")])).await.unwrap();
        let lock = &outcome.lockfile;
        assert_eq!(lock.res_dependencies["b@1.0.0"].dependencies["a"], "a@1.0.0");
        assert_eq!(lock.res_dependencies["a@1.0.0"].dependencies["b"], "b@1.0.0");
    }

    #[tokio::test]
    async fn test_scoped_packages() {
        let source = MemoryRegistry::new()
            .with(packument("@scope/app", &["2.0.0"], &[("@scope/util", "^1.0.0")]))
            .with(packument("@scope/util", &["1.4.0"], &[]));
        let resolver = resolver(source);

        let outcome = resolver.resolve(&roots(&[("@scope/app", "^2")])).await.unwrap();
        let lock = &outcome.lockfile;
        assert_eq!(
            lock.app_dependencies["@scope/app"].dependencies["@scope/util"],
            "@scope/util@1.4.0"
        );
        assert!(lock.res_dependencies.contains_key("@scope/util@1.4.0"));
        assert_eq!(
            lock.packages().collect::<Vec<_>>(),
            vec![("@scope/app", "2.0.0"), ("@scope/util", "1.4.0")]
        );
    }

    #[tokio::test]
    async fn test_empty_roots() {
        let resolver = resolver(MemoryRegistry::new());
        let outcome = resolver.resolve(&BTreeMap::new()).await.unwrap();
        assert!(outcome.lockfile.is_empty());
        assert_eq!(outcome.fetched_count, 0);
        assert_eq!(resolver.source().total_requests(), 0);
    }

    #[tokio::test]
    async fn test_root_not_found() {
        let resolver = resolver(MemoryRegistry::new());
        let err = resolver.resolve(&roots(&[("ghost", "*")])).await.unwrap_err();
        assert_eq!(err, ResolutionError::PackageNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn test_transitive_not_found() {
        let source = MemoryRegistry::new().with(packument("a", &["1.0.0"], &[("ghost", "^1.0.0")]));
        let err = resolver(source)
            .resolve(&roots(&[("a", "*")]))
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::PackageNotFound("ghost".into()));
    }

    #[tokio::test]
    async fn test_unsatisfied_range() {
        let source = MemoryRegistry::new().with(packument("a", &["1.0.0"], &[]));
        let err = resolver(source)
            .resolve(&roots(&[("a", "^9.0.0")]))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnsatisfiedRange {
                name: "a".into(),
                range: "^9.0.0".into()
            }
        );
    }

    #[tokio::test]
    async fn test_dist_tag_without_manifest() {
        let mut a = packument("a", &["1.0.0"], &[]);
        a.dist_tags.insert("next".into(), "5.0.0".into());
        let err = resolver(MemoryRegistry::new().with(a))
            .resolve(&roots(&[("a", "next")]))
            .await
            .unwrap_err();
        assert_eq!(err, ResolutionError::MissingVersion("a@5.0.0".into()));
    }

    #[tokio::test]
    async fn test_missing_peer_rejects() {
        let plugin = with_peers(
            packument("plugin", &["1.0.0"], &[]),
            "1.0.0",
            &[("x", "^2.0.0")],
        );
        let source = MemoryRegistry::new()
            .with(plugin)
            .with(packument("x", &["2.0.0"], &[]));

        let err = resolver(source)
            .resolve(&roots(&[("plugin", "*")]))
            .await
            .unwrap_err();
        let ResolutionError::MissingPeers(missing) = err else {
            panic!("expected MISSING_PEERS, got {err:?}");
        };
        assert_eq!(missing["x"]["plugin@1.0.0"], "^2.0.0");
    }

    #[tokio::test]
    async fn test_missing_peer_ignored_without_validation() {
        let plugin = with_peers(
            packument("plugin", &["1.0.0"], &[]),
            "1.0.0",
            &[("x", "^2.0.0")],
        );
        let source = MemoryRegistry::new()
            .with(plugin)
            .with(packument("x", &["2.0.0"], &[]));
        let resolver = Resolver::new(source, ResolverOptions::default().with_peer_validation(false));

        let outcome = resolver.resolve(&roots(&[("plugin", "*")])).await.unwrap();
        let warnings = &outcome.lockfile.warnings;
        assert!(warnings.missing_peers.is_empty());
        assert!(warnings.invalid_peers.is_empty());
        assert_eq!(warnings.requested_peers["plugin@1.0.0"]["x"], "^2.0.0");
    }

    #[tokio::test]
    async fn test_invalid_peer_is_warning() {
        let plugin = with_peers(
            packument("plugin", &["1.0.0"], &[]),
            "1.0.0",
            &[("x", "^2.0.0")],
        );
        let source = MemoryRegistry::new()
            .with(plugin)
            .with(packument("x", &["1.0.0", "2.0.0"], &[]));

        let outcome = resolver(source)
            .resolve(&roots(&[("plugin", "*"), ("x", "1.0.0")]))
            .await
            .unwrap();
        let lock = &outcome.lockfile;

        assert_eq!(lock.warnings.invalid_peers["plugin@1.0.0"]["x"], "^2.0.0");
        assert_eq!(lock.warnings.requested_peers["plugin@1.0.0"]["x"], "^2.0.0");
        assert_eq!(lock.app_dependencies["x"].version, "1.0.0");
        // The expanded peer range wins over the root reference.
        assert_eq!(lock.app_dependencies["plugin"].dependencies["x"], "x@2.0.0");
    }

    #[tokio::test]
    async fn test_satisfied_peer_references_root() {
        let plugin = with_peers(
            packument("plugin", &["1.0.0"], &[]),
            "1.0.0",
            &[("x", "^2.0.0")],
        );
        let source = MemoryRegistry::new()
            .with(plugin)
            .with(packument("x", &["2.0.0", "2.5.0"], &[]));

        let outcome = resolver(source)
            .resolve(&roots(&[("plugin", "*"), ("x", "2.5.0")]))
            .await
            .unwrap();
        let lock = &outcome.lockfile;
        assert!(lock.warnings.invalid_peers.is_empty());
        assert_eq!(lock.app_dependencies["plugin"].dependencies["x"], "x@2.5.0");
    }

    #[tokio::test]
    async fn test_hung_root_times_out() {
        let source = MemoryRegistry::new().hanging("slow");
        let resolver = Resolver::new(
            source,
            ResolverOptions::default().with_timeout(Duration::from_millis(100)),
        );

        let start = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(&roots(&[("slow", "*")])),
        )
        .await
        .expect("resolve must not hang");

        assert_eq!(result.unwrap_err(), ResolutionError::Timeout);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_hung_dependency_times_out() {
        let source = MemoryRegistry::new()
            .with(packument("a", &["1.0.0"], &[("slow", "^1.0.0")]))
            .hanging("slow");
        let resolver = Resolver::new(
            source,
            ResolverOptions::default().with_timeout(Duration::from_millis(100)),
        );

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            resolver.resolve(&roots(&[("a", "*")])),
        )
        .await
        .expect("resolve must not hang");

        assert_eq!(result.unwrap_err(), ResolutionError::Timeout);
    }

    #[tokio::test]
    async fn test_deterministic_across_concurrency() {
        let source = || {
            MemoryRegistry::new()
                .with(packument("a", &["1.0.0"], &[("c", "^1.0.0"), ("d", "*")]))
                .with(packument("b", &["1.0.0", "1.1.0"], &[("c", "^1.1.0")]))
                .with(packument("c", &["1.0.0", "1.1.0", "1.2.0"], &[("d", "^2.0.0")]))
                .with(packument("d", &["2.0.0", "2.1.0"], &[]))
                .delayed(Duration::from_millis(1))
        };
        let wanted = roots(&[("a", "^1.0.0"), ("b", "^1.0.0")]);

        let serial = Resolver::new(source(), ResolverOptions::default().with_concurrency(1))
            .resolve(&wanted)
            .await
            .unwrap();
        let parallel = Resolver::new(source(), ResolverOptions::default())
            .resolve(&wanted)
            .await
            .unwrap();
        let again = Resolver::new(source(), ResolverOptions::default())
            .resolve(&wanted)
            .await
            .unwrap();

        let json = serial.lockfile.to_json().unwrap();
        assert_eq!(json, parallel.lockfile.to_json().unwrap());
        assert_eq!(json, again.lockfile.to_json().unwrap());
    }

    #[tokio::test]
    async fn test_prerelease_option() {
        let source = || MemoryRegistry::new().with(packument("a", &["1.0.0", "1.1.0-beta.1"], &[]));
        let wanted = roots(&[("a", "^1.0.0")]);

        let included = resolver(source()).resolve(&wanted).await.unwrap();
        assert_eq!(included.lockfile.app_dependencies["a"].version, "1.1.0-beta.1");

        let excluded = Resolver::new(source(), ResolverOptions::default().with_prerelease(false))
            .resolve(&wanted)
            .await
            .unwrap();
        assert_eq!(excluded.lockfile.app_dependencies["a"].version, "1.0.0");
    }

    #[test]
    fn test_error_wire_format() {
        let err = ResolutionError::UnsatisfiedRange {
            name: "a".into(),
            range: "^9".into(),
        };
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({ "kind": "UNSATISFIED_RANGE", "data": { "name": "a", "range": "^9" } })
        );
        assert_eq!(
            serde_json::to_value(ResolutionError::Timeout).unwrap(),
            serde_json::json!({ "kind": "TIMEOUT" })
        );
        assert_eq!(
            serde_json::to_value(ResolutionError::PackageNotFound("x".into())).unwrap(),
            serde_json::json!({ "kind": "PACKAGE_NOT_FOUND", "data": "x" })
        );
        for err in [
            ResolutionError::PackageNotFound(String::new()),
            ResolutionError::MissingVersion(String::new()),
            ResolutionError::Timeout,
            ResolutionError::MissingPeers(PeerMap::new()),
        ] {
            let json = serde_json::to_value(&err).unwrap();
            assert_eq!(json["kind"], err.code());
        }
    }
}
