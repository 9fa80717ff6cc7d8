//! Path matching.
//!
//! # Responsibilities
//! - Compile route patterns (`/users/:id/files/*`) once, at registration
//! - Match a request path and capture parameters
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - Empty segments are ignored, so `/a//b/` matches `/a/b`
//! - No regex to guarantee O(n) matching

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Captured path parameters. A trailing wildcard is stored under `*`.
pub type Params = HashMap<String, String>;

/// Key of the wildcard capture in [`Params`].
pub const WILDCARD: &str = "*";

/// Trait for matching request paths.
pub trait Matcher: Send + Sync + fmt::Debug {
    /// Returns the captured parameters when `path` matches.
    fn matches(&self, path: &str) -> Option<Params>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatternError {
    #[error("route pattern {0:?} must start with '/'")]
    MissingLeadingSlash(String),
    #[error("route pattern {0:?} has a parameter without a name")]
    EmptyParam(String),
    #[error("route pattern {pattern:?} repeats parameter {name:?}")]
    DuplicateParam { pattern: String, name: String },
    #[error("route pattern {0:?} may only use '*' as its last segment")]
    MisplacedWildcard(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
    wildcard: bool,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        if !pattern.starts_with('/') {
            return Err(PatternError::MissingLeadingSlash(pattern.to_string()));
        }

        let parts: Vec<&str> = split(pattern).collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut wildcard = false;

        for (i, part) in parts.iter().enumerate() {
            if *part == WILDCARD {
                if i + 1 != parts.len() {
                    return Err(PatternError::MisplacedWildcard(pattern.to_string()));
                }
                wildcard = true;
            } else if let Some(name) = part.strip_prefix(':') {
                if name.is_empty() {
                    return Err(PatternError::EmptyParam(pattern.to_string()));
                }
                if segments.contains(&Segment::Param(name.to_string())) {
                    return Err(PatternError::DuplicateParam {
                        pattern: pattern.to_string(),
                        name: name.to_string(),
                    });
                }
                segments.push(Segment::Param(name.to_string()));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            wildcard,
        })
    }

    /// The pattern `/`.
    pub fn root() -> Self {
        Self {
            raw: "/".to_string(),
            segments: Vec::new(),
            wildcard: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

impl Matcher for PathPattern {
    fn matches(&self, path: &str) -> Option<Params> {
        let parts: Vec<&str> = split(path).collect();
        let fixed = self.segments.len();
        if parts.len() < fixed || (!self.wildcard && parts.len() != fixed) {
            return None;
        }

        let mut params = Params::new();
        for (segment, part) in self.segments.iter().zip(&parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), (*part).to_string());
                }
            }
        }
        if self.wildcard {
            params.insert(WILDCARD.to_string(), parts[fixed..].join("/"));
        }
        Some(params)
    }
}

/// Matches every path. Used by the generated catch-all route.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyPath;

impl Matcher for AnyPath {
    fn matches(&self, _path: &str) -> Option<Params> {
        Some(Params::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_params() {
        let pattern = PathPattern::parse("/users/:id/posts/:post").unwrap();
        let params = pattern.matches("/users/42/posts/7").unwrap();
        assert_eq!(params["id"], "42");
        assert_eq!(params["post"], "7");

        assert!(pattern.matches("/users/42/posts").is_none());
        assert!(pattern.matches("/Users/42/posts/7").is_none());
    }

    #[test]
    fn test_root() {
        let root = PathPattern::parse("/").unwrap();
        assert_eq!(root, PathPattern::root());
        assert!(root.matches("/").is_some());
        assert!(root.matches("").is_some());
        assert!(root.matches("/x").is_none());
    }

    #[test]
    fn test_trailing_slash_ignored() {
        let pattern = PathPattern::parse("/health").unwrap();
        assert!(pattern.matches("/health/").is_some());
    }

    #[test]
    fn test_wildcard_captures_rest() {
        let pattern = PathPattern::parse("/static/*").unwrap();
        assert_eq!(pattern.matches("/static/css/site.css").unwrap()[WILDCARD], "css/site.css");
        assert_eq!(pattern.matches("/static").unwrap()[WILDCARD], "");
        assert!(pattern.matches("/other").is_none());
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(matches!(
            PathPattern::parse("users"),
            Err(PatternError::MissingLeadingSlash(_))
        ));
        assert!(matches!(PathPattern::parse("/a/:"), Err(PatternError::EmptyParam(_))));
        assert!(matches!(
            PathPattern::parse("/a/:id/:id"),
            Err(PatternError::DuplicateParam { .. })
        ));
        assert!(matches!(
            PathPattern::parse("/a/*/b"),
            Err(PatternError::MisplacedWildcard(_))
        ));
    }

    #[test]
    fn test_any_path() {
        assert!(AnyPath.matches("/whatever/deep/path").is_some());
    }
}
