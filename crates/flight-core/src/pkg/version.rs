//! Version resolution using semver.
//!
//! npm range syntax is normalized into `semver::VersionReq` alternatives:
//! bare versions become exact comparators, x-ranges drop their wildcard
//! parts, hyphen ranges become `>=a, <=b` and space separated comparators are
//! joined with commas.

use super::error::PkgError;
use super::registry::Packument;
use semver::{BuildMetadata, Comparator, Op, Prerelease, Version, VersionReq};

/// A parsed npm range: a set of `||` alternatives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    alternatives: Vec<VersionReq>,
}

impl RangeSet {
    /// Parse an npm range. An empty range means `*`.
    ///
    /// Invalid alternatives of an `||` range are skipped as long as one parses.
    ///
    /// # Errors
    /// Returns an error if no alternative is a valid range.
    pub fn parse(range: &str) -> Result<Self, PkgError> {
        let range = range.trim();
        if range.is_empty() {
            return Ok(Self {
                alternatives: vec![VersionReq::STAR],
            });
        }

        let mut alternatives = Vec::new();
        let mut last_err = None;
        for alt in range.split("||").map(str::trim) {
            match parse_alternative(alt) {
                Ok(req) => alternatives.push(req),
                Err(e) => last_err = Some(e),
            }
        }

        if alternatives.is_empty() {
            return Err(last_err.unwrap_or_else(|| {
                PkgError::spec_invalid(format!("Invalid version range '{range}'"))
            }));
        }

        Ok(Self { alternatives })
    }

    /// Check a version against the range.
    ///
    /// With `include_prerelease`, pre-release versions are ordered like any
    /// other version instead of only matching comparators on the same
    /// `major.minor.patch`.
    #[must_use]
    pub fn matches(&self, version: &Version, include_prerelease: bool) -> bool {
        if !include_prerelease || version.pre.is_empty() {
            return self.alternatives.iter().any(|req| req.matches(version));
        }

        let version = Version {
            build: BuildMetadata::EMPTY,
            ..version.clone()
        };
        self.alternatives
            .iter()
            .any(|req| req.comparators.iter().all(|c| allows(c, &version)))
    }
}

/// Parse one `||` alternative.
fn parse_alternative(alt: &str) -> Result<VersionReq, PkgError> {
    let invalid = |e: &dyn std::fmt::Display| {
        PkgError::spec_invalid(format!("Invalid version range '{alt}': {e}"))
    };

    let comparators = if let Some((start, end)) = alt.split_once(" - ") {
        let (start, end) = (start.trim(), end.trim());
        if start.is_empty() || end.is_empty() {
            return Err(invalid(&"empty hyphen bound"));
        }
        vec![
            normalize_comparator(&format!(">={start}")),
            normalize_comparator(&format!("<={end}")),
        ]
    } else {
        tokenize(alt)
            .iter()
            .map(|c| normalize_comparator(c))
            .collect()
    };

    let comparators: Vec<String> = comparators.into_iter().flatten().collect();
    if comparators.is_empty() {
        return Ok(VersionReq::STAR);
    }

    VersionReq::parse(&comparators.join(", ")).map_err(|e| invalid(&e))
}

/// Split an alternative into comparators, re-attaching detached operators
/// (`>= 2.1.2 < 3` becomes `>=2.1.2`, `<3`).
fn tokenize(alt: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut pending_op = String::new();

    for tok in alt
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        if tok.chars().all(is_op_char) {
            pending_op.push_str(tok);
        } else {
            out.push(format!("{}{tok}", std::mem::take(&mut pending_op)));
        }
    }

    out
}

fn is_op_char(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^')
}

/// Rewrite one npm comparator into `semver` syntax. `None` means "any version".
fn normalize_comparator(comparator: &str) -> Option<String> {
    let split = comparator
        .find(|c: char| !is_op_char(c))
        .unwrap_or(comparator.len());
    let (op, rest) = comparator.split_at(split);
    let rest = rest.strip_prefix(['v', 'V']).unwrap_or(rest);

    // Keep the numeric core apart from any pre-release/build suffix.
    let core_end = rest.find(['-', '+']).unwrap_or(rest.len());
    let (core, suffix) = rest.split_at(core_end);

    let mut parts: Vec<&str> = Vec::new();
    let mut truncated = false;
    for part in core.split('.') {
        if matches!(part, "x" | "X" | "*" | "") {
            truncated = true;
            break;
        }
        parts.push(part);
    }

    if parts.is_empty() {
        return None;
    }

    // npm treats a bare version as exact, semver as caret.
    let op = if op.is_empty() { "=" } else { op };
    let suffix = if truncated { "" } else { suffix };
    Some(format!("{op}{}{suffix}", parts.join(".")))
}

/// Lowest pre-release of `major.minor.patch` (`x.y.z-0`).
fn floor(major: u64, minor: u64, patch: u64) -> Version {
    Version {
        major,
        minor,
        patch,
        pre: Prerelease::new("0").unwrap_or_default(),
        build: BuildMetadata::EMPTY,
    }
}

/// Inclusive lower bound a comparator starts at.
fn lower_bound(c: &Comparator) -> Version {
    match (c.minor, c.patch) {
        (Some(minor), Some(patch)) => Version {
            major: c.major,
            minor,
            patch,
            pre: c.pre.clone(),
            build: BuildMetadata::EMPTY,
        },
        (minor, _) => floor(c.major, minor.unwrap_or(0), 0),
    }
}

/// Exclusive upper bound of the partial version `c` names (`1.2` -> `1.3.0-0`).
fn partial_upper(c: &Comparator) -> Version {
    match c.minor {
        Some(minor) => floor(c.major, minor + 1, 0),
        None => floor(c.major + 1, 0, 0),
    }
}

/// Comparator check where pre-releases take part in ordinary ordering.
fn allows(c: &Comparator, v: &Version) -> bool {
    let complete = c.minor.is_some() && c.patch.is_some();
    match c.op {
        Op::Exact | Op::Wildcard => {
            if complete {
                *v == lower_bound(c)
            } else {
                *v >= lower_bound(c) && *v < partial_upper(c)
            }
        }
        Op::Greater => {
            if complete {
                *v > lower_bound(c)
            } else {
                *v >= partial_upper(c)
            }
        }
        Op::GreaterEq => *v >= lower_bound(c),
        Op::Less => *v < lower_bound(c),
        Op::LessEq => {
            if complete {
                *v <= lower_bound(c)
            } else {
                *v < partial_upper(c)
            }
        }
        Op::Tilde => *v >= lower_bound(c) && *v < partial_upper(c),
        Op::Caret => {
            let upper = match (c.major, c.minor, c.patch) {
                (0, Some(0), Some(patch)) => floor(0, 0, patch + 1),
                (0, Some(minor), _) => floor(0, minor + 1, 0),
                (major, _, _) => floor(major + 1, 0, 0),
            };
            *v >= lower_bound(c) && *v < upper
        }
        _ => c.matches(v),
    }
}

/// Parse a version key from a packument, tolerating a leading `v` or `=`.
fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V', '=']);
    Version::parse(trimmed).ok()
}

/// Resolve a version specifier against a packument.
///
/// # Rules
/// - A non-empty `spec` naming a dist-tag returns the tagged version
/// - Otherwise `spec` is a range (`""` means `*`) and the highest satisfying
///   version wins
/// - If nothing satisfies `*`, fall back to `dist-tags.latest`
///
/// Returns `None` when nothing applies.
#[must_use]
pub fn resolve_version(
    spec: &str,
    packument: &Packument,
    include_prerelease: bool,
) -> Option<String> {
    let spec = spec.trim();

    if !spec.is_empty() {
        if let Some(tagged) = packument.dist_tags.get(spec) {
            return Some(tagged.clone());
        }
    }

    let range = if spec.is_empty() { "*" } else { spec };

    if packument.versions.contains_key(range) {
        return Some(range.to_string());
    }

    let best = RangeSet::parse(range).ok().and_then(|set| {
        packument
            .versions
            .keys()
            .filter_map(|key| parse_version(key).map(|v| (v, key)))
            .filter(|(v, _)| set.matches(v, include_prerelease))
            .max_by(|(a, _), (b, _)| a.cmp(b))
            .map(|(_, key)| key.clone())
    });

    if best.is_none() && range == "*" {
        return packument.latest().map(String::from);
    }

    best
}

/// Check whether a concrete version satisfies an npm range.
///
/// Unparseable versions or ranges never satisfy.
#[must_use]
pub fn version_satisfies(version: &str, range: &str, include_prerelease: bool) -> bool {
    match (parse_version(version), RangeSet::parse(range)) {
        (Some(v), Ok(set)) => set.matches(&v, include_prerelease),
        _ => false,
    }
}
