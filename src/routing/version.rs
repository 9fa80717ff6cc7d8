//! API version negotiation.
//!
//! Routes declare versions; clients ask with `Accept-Version`. A bare
//! version (`1.2.0`, `1.2`, `1`) pins that version with the missing parts
//! free; anything else is read as a semver range (`~1`, `^2.1`, `1.x`,
//! `>=1.2`, `*`).

use std::cmp::Ordering;
use std::fmt;

use semver::{Version, VersionReq};

/// What the client asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Matches every declared version.
    Any,
    Req(VersionReq),
    /// Not semver at all; compared as a plain string.
    Literal(String),
}

impl VersionSpec {
    pub fn parse(requested: &str) -> Self {
        let requested = requested.trim();
        let bare = requested.starts_with(|c: char| c.is_ascii_digit())
            && requested.chars().all(|c| c.is_ascii_digit() || c == '.');
        let candidate = if bare {
            format!("={}", requested)
        } else {
            requested.to_string()
        };
        match VersionReq::parse(&candidate) {
            Ok(req) => VersionSpec::Req(req),
            Err(_) => VersionSpec::Literal(requested.to_string()),
        }
    }

    pub fn satisfied_by(&self, declared: &DeclaredVersion) -> bool {
        match self {
            VersionSpec::Any => true,
            VersionSpec::Req(req) => declared.parsed.as_ref().is_some_and(|v| req.matches(v)),
            VersionSpec::Literal(raw) => declared.raw == *raw,
        }
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Any => f.write_str("*"),
            VersionSpec::Req(req) => write!(f, "{}", req),
            VersionSpec::Literal(raw) => f.write_str(raw),
        }
    }
}

/// A version a route declares it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredVersion {
    raw: String,
    parsed: Option<Version>,
}

impl DeclaredVersion {
    /// Lenient: `1` and `1.2` are read as `1.0.0` and `1.2.0`, a leading `v`
    /// is dropped. Anything else unparseable is kept for literal matching.
    pub fn new(raw: &str) -> Self {
        let raw = raw.trim();
        let stripped = raw.strip_prefix(['v', 'V']).unwrap_or(raw);
        let parsed = Version::parse(stripped).ok().or_else(|| {
            let parts: Vec<u64> = stripped
                .split('.')
                .map(|p| p.parse::<u64>().ok())
                .collect::<Option<_>>()?;
            match parts.as_slice() {
                [major] => Some(Version::new(*major, 0, 0)),
                [major, minor] => Some(Version::new(*major, *minor, 0)),
                _ => None,
            }
        });
        Self {
            raw: raw.to_string(),
            parsed,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for DeclaredVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialOrd for DeclaredVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Semver order; unparseable versions sort lowest, by text.
impl Ord for DeclaredVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parsed
            .cmp(&other.parsed)
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn satisfied(requested: &str, declared: &str) -> bool {
        VersionSpec::parse(requested).satisfied_by(&DeclaredVersion::new(declared))
    }

    #[test]
    fn test_exact_versions() {
        assert!(satisfied("1.0.0", "1.0.0"));
        assert!(!satisfied("1.0.0", "1.0.1"));
        assert!(satisfied("2.0.0", "2"));
    }

    #[test]
    fn test_partial_versions_pin_prefix() {
        assert!(satisfied("1.2", "1.2.7"));
        assert!(!satisfied("1.2", "1.3.0"));
        assert!(satisfied("1", "1.9.0"));
        assert!(!satisfied("1", "2.0.0"));
    }

    #[test]
    fn test_ranges() {
        assert!(satisfied("~1", "1.4.0"));
        assert!(satisfied("^2.1", "2.3.0"));
        assert!(!satisfied("^2.1", "2.0.9"));
        assert!(satisfied("1.x", "1.0.0"));
        assert!(satisfied("*", "7.1.2"));
        assert!(satisfied(">=1.2", "3.0.0"));
        assert!(!satisfied(">=1.2", "1.1.0"));
    }

    #[test]
    fn test_literal_versions() {
        assert!(satisfied("beta", "beta"));
        assert!(!satisfied("beta", "1.0.0"));
        assert!(VersionSpec::Any.satisfied_by(&DeclaredVersion::new("anything")));
    }

    #[test]
    fn test_declared_order() {
        let mut versions = vec![
            DeclaredVersion::new("2.0.0"),
            DeclaredVersion::new("legacy"),
            DeclaredVersion::new("v1.5"),
            DeclaredVersion::new("10.0.0"),
        ];
        versions.sort();
        let raw: Vec<&str> = versions.iter().map(DeclaredVersion::as_str).collect();
        assert_eq!(raw, vec!["legacy", "v1.5", "2.0.0", "10.0.0"]);
    }
}
