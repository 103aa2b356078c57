//! Package spec parsing.
//!
//! Parses root specifiers given on the command line:
//! - `left-pad`
//! - `left-pad@1.3.0`
//! - `react@^18.0.0`
//! - `react@next` (dist-tag)
//! - `@types/node`
//! - `@types/node@^20`

use super::error::PkgError;

/// A parsed package specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Full package name (e.g., "@scope/name" or "name").
    pub name: String,
    /// Version range, exact version or dist-tag. `None` means any version.
    pub range: Option<String>,
}

impl PackageSpec {
    /// Parse a package specification string.
    ///
    /// # Errors
    /// Returns an error if the spec is invalid.
    pub fn parse(input: &str) -> Result<Self, PkgError> {
        let input = input.trim();

        if input.is_empty() {
            return Err(PkgError::spec_invalid("Empty package spec"));
        }

        // The version delimiter is the first '@' after the (optional) scope.
        let (name, range) = if let Some(scoped) = input.strip_prefix('@') {
            let Some((scope, rest)) = scoped.split_once('/') else {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid scoped package: missing '/' in '{input}'"
                )));
            };
            if scope.is_empty() {
                return Err(PkgError::spec_invalid(format!(
                    "Invalid scoped package: empty scope in '{input}'"
                )));
            }
            let (pkg, range) = split_range(rest);
            validate_name(pkg, input)?;
            (format!("@{scope}/{pkg}"), range)
        } else {
            let (pkg, range) = split_range(input);
            validate_name(pkg, input)?;
            (pkg.to_string(), range)
        };

        if range.is_some_and(str::is_empty) {
            return Err(PkgError::spec_invalid(format!(
                "Invalid package spec: empty version range in '{input}'"
            )));
        }

        Ok(Self {
            name,
            range: range.map(String::from),
        })
    }

    /// The specifier handed to the resolver; a missing range means "any".
    #[must_use]
    pub fn range_or_wildcard(&self) -> &str {
        self.range.as_deref().unwrap_or("*")
    }

    /// Check if this is a scoped package.
    #[must_use]
    pub fn is_scoped(&self) -> bool {
        self.name.starts_with('@')
    }
}

fn split_range(s: &str) -> (&str, Option<&str>) {
    match s.split_once('@') {
        Some((name, range)) => (name, Some(range)),
        None => (s, None),
    }
}

fn validate_name(name: &str, input: &str) -> Result<(), PkgError> {
    if name.is_empty() {
        return Err(PkgError::spec_invalid(format!(
            "Invalid package spec: empty name in '{input}'"
        )));
    }

    for c in name.chars() {
        if !c.is_alphanumeric() && c != '-' && c != '_' && c != '.' {
            return Err(PkgError::spec_invalid(format!(
                "Invalid character '{c}' in package name '{name}'"
            )));
        }
    }

    Ok(())
}

/// Escape a package name the way the registry addresses it.
///
/// Scoped names keep the leading `@` and encode the `/` as `%2F`; unscoped
/// names are used as-is.
#[must_use]
pub fn escape_name(name: &str) -> String {
    if name.starts_with('@') {
        name.replacen('/', "%2F", 1)
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple() {
        let spec = PackageSpec::parse("left-pad").unwrap();
        assert_eq!(spec.name, "left-pad");
        assert_eq!(spec.range, None);
        assert_eq!(spec.range_or_wildcard(), "*");
    }

    #[test]
    fn test_parse_with_range() {
        let spec = PackageSpec::parse("react@^18.0.0").unwrap();
        assert_eq!(spec.name, "react");
        assert_eq!(spec.range.as_deref(), Some("^18.0.0"));
    }

    #[test]
    fn test_parse_dist_tag() {
        let spec = PackageSpec::parse("react@next").unwrap();
        assert_eq!(spec.range_or_wildcard(), "next");
    }

    #[test]
    fn test_parse_scoped() {
        let spec = PackageSpec::parse("@types/node").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert!(spec.is_scoped());
        assert_eq!(spec.range, None);
    }

    #[test]
    fn test_parse_scoped_with_range() {
        let spec = PackageSpec::parse("@types/node@^20").unwrap();
        assert_eq!(spec.name, "@types/node");
        assert_eq!(spec.range.as_deref(), Some("^20"));
    }

    #[test]
    fn test_parse_range_keeps_spaces() {
        let spec = PackageSpec::parse("pkg@>= 1.0.0 < 2.0.0").unwrap();
        assert_eq!(spec.range.as_deref(), Some(">= 1.0.0 < 2.0.0"));
    }

    #[test]
    fn test_parse_invalid() {
        assert!(PackageSpec::parse("").is_err());
        assert!(PackageSpec::parse("   ").is_err());
        assert!(PackageSpec::parse("@").is_err());
        assert!(PackageSpec::parse("@scope").is_err());
        assert!(PackageSpec::parse("@scope/").is_err());
        assert!(PackageSpec::parse("@/pkg").is_err());
        assert!(PackageSpec::parse("react@").is_err());
        assert!(PackageSpec::parse("@types/node@").is_err());
        assert!(PackageSpec::parse("bad name").is_err());
    }

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("left-pad"), "left-pad");
        assert_eq!(escape_name("@types/node"), "@types%2Fnode");
    }
}
