//! Package manager error types.

use std::fmt;
use std::io;

/// Package manager error codes.
pub mod codes {
    pub const PKG_SPEC_INVALID: &str = "PKG_SPEC_INVALID";
    pub const PKG_NOT_FOUND: &str = "PKG_NOT_FOUND";
    pub const PKG_REGISTRY_ERROR: &str = "PKG_REGISTRY_ERROR";
    pub const PKG_FETCH_CANCELLED: &str = "PKG_FETCH_CANCELLED";

    pub const PKG_PACKAGE_JSON_NOT_FOUND: &str = "PKG_PACKAGE_JSON_NOT_FOUND";
    pub const PKG_PACKAGE_JSON_INVALID: &str = "PKG_PACKAGE_JSON_INVALID";
    pub const PKG_DEP_RANGE_INVALID: &str = "PKG_DEP_RANGE_INVALID";

    pub const PKG_LOCK_NOT_FOUND: &str = "PKG_LOCK_NOT_FOUND";
    pub const PKG_LOCK_INVALID_JSON: &str = "PKG_LOCK_INVALID_JSON";
    pub const PKG_LOCK_WRITE_FAILED: &str = "PKG_LOCK_WRITE_FAILED";
}

/// Package manager error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgError {
    code: &'static str,
    message: String,
}

impl PkgError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn spec_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_SPEC_INVALID, msg)
    }

    #[must_use]
    pub fn not_found(name: &str) -> Self {
        Self::new(codes::PKG_NOT_FOUND, format!("Package not found: {name}"))
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_REGISTRY_ERROR, msg)
    }

    /// The fetch was abandoned because the resolution was cancelled.
    #[must_use]
    pub fn cancelled(name: &str) -> Self {
        Self::new(
            codes::PKG_FETCH_CANCELLED,
            format!("Fetch of '{name}' cancelled"),
        )
    }

    #[must_use]
    pub fn package_json_not_found(path: &std::path::Path) -> Self {
        Self::new(
            codes::PKG_PACKAGE_JSON_NOT_FOUND,
            format!("package.json not found: {}", path.display()),
        )
    }

    pub fn package_json_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, msg)
    }

    /// Whether this error means the registry does not know the package at all.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == codes::PKG_NOT_FOUND
    }
}

impl fmt::Display for PkgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for PkgError {}

impl From<io::Error> for PkgError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::PKG_PACKAGE_JSON_INVALID, e.to_string())
    }
}

impl From<reqwest::Error> for PkgError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::registry(format!("Request timed out: {e}"))
        } else if e.is_connect() {
            Self::registry(format!("Connection failed: {e}"))
        } else if e.is_decode() {
            Self::registry(format!("Invalid packument: {e}"))
        } else {
            Self::registry(e.to_string())
        }
    }
}

impl From<serde_json::Error> for PkgError {
    fn from(e: serde_json::Error) -> Self {
        Self::registry(format!("Invalid JSON: {e}"))
    }
}
