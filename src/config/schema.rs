//! Configuration schema definitions.
//!
//! [`RawConfig`] is the shape accepted from config files (and from code). It is
//! normalized into a [`ServerConfig`] by [`normalize`](crate::config::normalize),
//! which applies defaults and validates the result.

use std::fmt;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderName;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::config::validation::ValidationError;
use crate::http::format::{Formatters, ResponseTimeFormatter};
use crate::http::{RequestHandlerError, ResponseBody};

/// Server name used when none is configured.
pub const DEFAULT_NAME: &str = "api-server";

/// API version assumed for requests that do not ask for one.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Header carrying the request processing time.
pub const DEFAULT_RESPONSE_TIME_HEADER: &str = "X-Response-Time";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;
pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 300;

/// Configuration as supplied by the operator, before defaults are applied.
///
/// Every key is optional. Keys are accepted in snake_case and in their
/// camelCase spelling (`defaultVersion`, `responseTimeHeader`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    /// Server name, reported in the `Server` response header.
    pub name: Option<String>,

    /// Address to bind (default "0.0.0.0").
    pub host: Option<String>,

    /// Listening port. Signed so that negative values can be reported.
    pub port: Option<i64>,

    /// API version used when a request does not state one.
    #[serde(alias = "defaultVersion")]
    pub default_version: Option<String>,

    /// Name of the response-time header.
    #[serde(
        alias = "responseTimeHeader",
        alias = "responseTimeHeaderName",
        alias = "response_time_header_name"
    )]
    pub response_time_header: Option<String>,

    /// Maximum accepted request body, in bytes.
    #[serde(alias = "maxBodySize")]
    pub max_body_size: Option<usize>,

    /// Graceful drain deadline on stop, in seconds.
    #[serde(alias = "shutdownTimeoutSecs")]
    pub shutdown_timeout_secs: Option<u64>,

    /// Buffer size of the event broadcast channel.
    #[serde(alias = "eventCapacity")]
    pub event_capacity: Option<usize>,

    /// Accepted skew between the `Date` request header and the local clock.
    #[serde(alias = "dateClockSkewSecs")]
    pub date_clock_skew_secs: Option<u64>,

    /// TLS material. Accepts `cert` or `certificate` for the certificate.
    #[serde(alias = "ssl")]
    pub tls: Option<RawTls>,

    pub observability: ObservabilityConfig,
}

/// TLS section as written by the operator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawTls {
    pub cert: Option<PemSource>,
    pub certificate: Option<PemSource>,
    pub key: Option<PemSource>,
    pub ca: Vec<PemSource>,
}

/// Canonical TLS configuration.
///
/// The certificate is always exposed as `cert`, whichever alias was used on
/// input. Serializing yields the canonical key only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawTls")]
pub struct TlsConfig {
    /// Server certificate (PEM).
    pub cert: PemSource,

    /// Private key (PEM).
    pub key: PemSource,

    /// CA certificates, appended to the served chain in order.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ca: Vec<PemSource>,
}

impl TlsConfig {
    pub fn new(cert: impl Into<PemSource>, key: impl Into<PemSource>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
            ca: Vec::new(),
        }
    }

    pub fn with_ca(mut self, ca: impl Into<PemSource>) -> Self {
        self.ca.push(ca.into());
        self
    }
}

impl TryFrom<RawTls> for TlsConfig {
    type Error = ValidationError;

    fn try_from(raw: RawTls) -> Result<Self, Self::Error> {
        let cert = match (raw.certificate, raw.cert) {
            (Some(certificate), Some(_)) => {
                tracing::warn!("Both tls.certificate and tls.cert are set; using tls.certificate");
                certificate
            }
            (Some(certificate), None) => certificate,
            (None, Some(cert)) => cert,
            (None, None) => return Err(ValidationError::MissingTlsField("cert")),
        };
        let key = raw.key.ok_or(ValidationError::MissingTlsField("key"))?;

        Ok(Self { cert, key, ca: raw.ca })
    }
}

/// Where PEM material comes from: a file on disk or inline bytes.
#[derive(Clone, PartialEq, Eq)]
pub enum PemSource {
    Path(PathBuf),
    Inline(Vec<u8>),
}

impl PemSource {
    /// Read the PEM bytes.
    pub async fn read(&self) -> io::Result<Vec<u8>> {
        match self {
            PemSource::Path(path) => tokio::fs::read(path).await,
            PemSource::Inline(bytes) => Ok(bytes.clone()),
        }
    }
}

impl From<&str> for PemSource {
    fn from(value: &str) -> Self {
        if value.contains("-----BEGIN") {
            PemSource::Inline(value.as_bytes().to_vec())
        } else {
            PemSource::Path(PathBuf::from(value))
        }
    }
}

impl From<String> for PemSource {
    fn from(value: String) -> Self {
        PemSource::from(value.as_str())
    }
}

impl From<PathBuf> for PemSource {
    fn from(value: PathBuf) -> Self {
        PemSource::Path(value)
    }
}

impl From<Vec<u8>> for PemSource {
    fn from(value: Vec<u8>) -> Self {
        PemSource::Inline(value)
    }
}

// Inline material may be a private key; never print it.
impl fmt::Debug for PemSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PemSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            PemSource::Inline(bytes) => write!(f, "Inline(<{} bytes>)", bytes.len()),
        }
    }
}

impl Serialize for PemSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PemSource::Path(path) => serializer.serialize_str(&path.to_string_lossy()),
            PemSource::Inline(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

impl<'de> Deserialize<'de> for PemSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(PemSource::from)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Normalized server configuration, owned by the server for its lifetime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub default_version: String,
    pub response_time_header: HeaderName,
    /// Formats the response-time header value from milliseconds.
    pub response_time_formatter: Option<ResponseTimeFormatter>,
    /// Serializers keyed by content type, overriding the built-in ones.
    pub formatters: Formatters,
    pub max_body_size: usize,
    pub shutdown_timeout: Duration,
    pub event_capacity: usize,
    pub date_clock_skew: Duration,
    pub observability: ObservabilityConfig,
    tls: Option<TlsConfig>,
}

impl ServerConfig {
    /// Defaults with the given port.
    pub fn with_port(port: u16) -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            host: DEFAULT_HOST.to_string(),
            port,
            default_version: DEFAULT_VERSION.to_string(),
            response_time_header: HeaderName::from_static("x-response-time"),
            response_time_formatter: None,
            formatters: Formatters::default(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            date_clock_skew: Duration::from_secs(DEFAULT_CLOCK_SKEW_SECS),
            observability: ObservabilityConfig::default(),
            tls: None,
        }
    }

    /// Canonical TLS configuration, if any.
    pub fn tls(&self) -> Option<&TlsConfig> {
        self.tls.as_ref()
    }

    /// Replace the TLS configuration. `None` disables TLS.
    pub fn set_tls(&mut self, tls: Option<TlsConfig>) {
        self.tls = tls;
    }

    /// Replace the TLS configuration from its raw form, accepting either
    /// certificate alias.
    pub fn set_raw_tls(&mut self, raw: Option<RawTls>) -> Result<(), ValidationError> {
        self.tls = raw.map(TlsConfig::try_from).transpose()?;
        Ok(())
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_default_version(mut self, version: impl Into<String>) -> Self {
        self.default_version = version.into();
        self
    }

    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    pub fn with_response_time_formatter<F>(mut self, formatter: F) -> Self
    where
        F: Fn(f64) -> String + Send + Sync + 'static,
    {
        self.response_time_formatter = Some(ResponseTimeFormatter::new(formatter));
        self
    }

    pub fn with_formatter<F>(mut self, content_type: &str, formatter: F) -> Self
    where
        F: Fn(&ResponseBody) -> Result<Bytes, RequestHandlerError> + Send + Sync + 'static,
    {
        self.formatters.insert(content_type, formatter);
        self
    }

    /// "host:port" string the listener binds to.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::with_port(DEFAULT_PORT)
    }
}
