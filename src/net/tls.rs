//! TLS configuration and certificate loading.

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::{PemSource, TlsConfig};

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {what}: {source}")]
    Read {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid PEM in {what}: {source}")]
    InvalidPem {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(&'static str),
    #[error("no private key found in key")]
    NoPrivateKey,
    #[error("invalid TLS configuration: {0}")]
    Config(#[source] std::io::Error),
}

async fn read(source: &PemSource, what: &'static str) -> Result<Vec<u8>, TlsError> {
    source.read().await.map_err(|source| TlsError::Read { what, source })
}

fn count_certificates(pem: &[u8], what: &'static str) -> Result<usize, TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::InvalidPem { what, source })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(what));
    }
    Ok(certs.len())
}

/// Build the rustls config. CA certificates are appended to the served chain.
pub async fn load_rustls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let mut chain = read(&tls.cert, "cert").await?;
    let mut chain_len = count_certificates(&chain, "cert")?;

    let key = read(&tls.key, "key").await?;
    rustls_pemfile::private_key(&mut &key[..])
        .map_err(|source| TlsError::InvalidPem { what: "key", source })?
        .ok_or(TlsError::NoPrivateKey)?;

    for ca in &tls.ca {
        let pem = read(ca, "ca").await?;
        chain_len += count_certificates(&pem, "ca")?;
        if !chain.ends_with(b"\n") {
            chain.push(b'\n');
        }
        chain.extend_from_slice(&pem);
    }

    tracing::debug!(certificates = chain_len, "Loaded TLS material");

    RustlsConfig::from_pem(chain, key).await.map_err(TlsError::Config)
}
