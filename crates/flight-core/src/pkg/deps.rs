//! Root specifiers from package.json.
//!
//! Produces the `name -> version spec` map the resolver starts from.

use super::error::{codes, PkgError};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

/// Root dependencies read from package.json.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDeps {
    /// Dependency name -> version spec.
    pub deps: BTreeMap<String, String>,
    /// Entries that were skipped.
    pub skipped: Vec<PkgDepError>,
}

/// A dependency entry that could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkgDepError {
    /// Package name, or the section name for a malformed section.
    pub name: String,
    pub code: &'static str,
    pub message: String,
}

impl PkgDepError {
    fn invalid_range(name: &str, actual_type: &str) -> Self {
        Self {
            name: name.to_string(),
            code: codes::PKG_DEP_RANGE_INVALID,
            message: format!("expected string, got {actual_type}"),
        }
    }

    fn invalid_section(section: &str, actual_type: &str) -> Self {
        Self {
            name: section.to_string(),
            code: codes::PKG_PACKAGE_JSON_INVALID,
            message: format!("'{section}' must be an object, got {actual_type}"),
        }
    }
}

/// Read root dependencies from a package.json file.
///
/// `dependencies` wins over `devDependencies` when both name a package.
/// Non-string ranges and malformed sections are reported in
/// [`PackageDeps::skipped`] instead of failing the read.
///
/// # Errors
/// Returns `PkgError` if the file is missing, unreadable or not a JSON object.
pub fn read_package_deps(package_json_path: &Path, include_dev: bool) -> Result<PackageDeps, PkgError> {
    if !package_json_path.exists() {
        return Err(PkgError::package_json_not_found(package_json_path));
    }

    let content = flight_util::fs::read_to_string_lossy(package_json_path)
        .map_err(|e| PkgError::package_json_invalid(format!("Failed to read: {e}")))?;

    let pkg_json: Value = serde_json::from_str(&content)
        .map_err(|e| PkgError::package_json_invalid(format!("Invalid JSON: {e}")))?;

    let root = pkg_json
        .as_object()
        .ok_or_else(|| PkgError::package_json_invalid("package.json must be a JSON object"))?;

    let mut result = PackageDeps::default();

    if include_dev {
        extract_section(root, "devDependencies", &mut result);
    }
    extract_section(root, "dependencies", &mut result);

    for skipped in &result.skipped {
        tracing::warn!(name = %skipped.name, code = skipped.code, "{}", skipped.message);
    }

    Ok(result)
}

fn extract_section(root: &serde_json::Map<String, Value>, section: &str, out: &mut PackageDeps) {
    let Some(value) = root.get(section) else {
        return;
    };

    let Some(entries) = value.as_object() else {
        out.skipped
            .push(PkgDepError::invalid_section(section, json_type_name(value)));
        return;
    };

    for (name, range) in entries {
        match range.as_str() {
            Some(range) => {
                out.deps.insert(name.clone(), range.to_string());
            }
            None => out
                .skipped
                .push(PkgDepError::invalid_range(name, json_type_name(range))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
