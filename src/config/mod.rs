//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML) or RawConfig built in code
//!     → loader.rs (parse, apply defaults)
//!     → validation.rs (semantic checks)
//!     → ServerConfig (normalized, owned by the server)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - TLS certificate accepted as `cert` or `certificate`, exposed as `cert`
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, normalize, parse_config, ConfigError};
pub use schema::{LogFormat, ObservabilityConfig, PemSource, RawConfig, RawTls, ServerConfig, TlsConfig};
pub use validation::ValidationError;
