//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request (method, path, requested version)
//!     → router.rs (tiered lookup)
//!     → matcher.rs (path patterns, parameter capture)
//!     → version.rs (negotiate against declared versions)
//!     → Return: matched Route, 405, or version-not-allowed
//!
//! Route generation (at start):
//!     RouteDefinition[]
//!     → Compile patterns
//!     → Add root fallback if nothing serves "/"
//!     → Add catch-all
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path
//! - Deterministic: same input always matches same route

pub mod handler;
pub mod matcher;
pub mod router;
pub mod version;

pub use handler::{BoxedHandler, Handler};
pub use matcher::{AnyPath, Matcher, Params, PathPattern, PatternError};
pub use router::{Resolution, Route, RouteDefinition, RouteKind, Router, ALL_METHODS};
pub use version::{DeclaredVersion, VersionSpec};
