use crate::pkg::{RegistryClient, ResolverOptions, DEFAULT_REGISTRY, LOCKFILE_NAME, REGISTRY_ENV};
use crate::pkg::PkgError;
use std::path::PathBuf;

/// Runtime configuration for the flight CLI.
#[derive(Debug, Clone)]
pub struct Config {
    /// Current working directory.
    pub cwd: PathBuf,

    /// Whether to emit JSON logs.
    pub json_logs: bool,

    /// Verbosity level (0 = INFO, 1 = DEBUG, 2+ = TRACE).
    pub verbosity: u8,

    /// Registry URL given on the command line. Falls back to
    /// `FLIGHT_NPM_REGISTRY`, then the public npm registry.
    pub registry_url: Option<String>,

    /// Resolver tuning.
    pub resolver: ResolverOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            json_logs: false,
            verbosity: 0,
            registry_url: None,
            resolver: ResolverOptions::default(),
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set verbosity level.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set JSON log output.
    #[must_use]
    pub fn with_json_logs(mut self, json: bool) -> Self {
        self.json_logs = json;
        self
    }

    #[must_use]
    pub fn with_registry_url(mut self, url: Option<String>) -> Self {
        self.registry_url = url;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ResolverOptions) -> Self {
        self.resolver = resolver;
        self
    }

    /// Registry URL in effect: flag, then environment, then default.
    #[must_use]
    pub fn effective_registry_url(&self) -> String {
        self.registry_url
            .clone()
            .or_else(|| std::env::var(REGISTRY_ENV).ok().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| DEFAULT_REGISTRY.to_string())
    }

    /// Build the registry client for this configuration.
    ///
    /// # Errors
    /// Returns an error if the registry URL is invalid.
    pub fn registry_client(&self) -> Result<RegistryClient, PkgError> {
        RegistryClient::new(&self.effective_registry_url())
    }

    #[must_use]
    pub fn package_json_path(&self) -> PathBuf {
        self.cwd.join("package.json")
    }

    #[must_use]
    pub fn lockfile_path(&self) -> PathBuf {
        self.cwd.join(LOCKFILE_NAME)
    }
}
