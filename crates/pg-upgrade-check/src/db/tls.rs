//! TLS setup for PostgreSQL connections.
//!
//! The TLS mode comes from the `sslmode` parameter of the connection string.
//! tokio-postgres itself only understands `disable`, `prefer` and `require`,
//! so the verifying modes are translated here: the connection string handed
//! to tokio-postgres says `require` and the rustls config does the
//! certificate checks.

use std::sync::Arc;

use rustls::client::WantsClientCert;
use rustls::{ClientConfig, ConfigBuilder};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::error::{CheckError, Result};

/// SSL modes accepted in connection strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// No SSL/TLS (plain TCP connection).
    Disable,
    /// Try TLS, fall back to plain TCP; certificate not verified.
    #[default]
    Prefer,
    /// Use TLS but don't verify the server certificate.
    Require,
    /// Verify server certificate against the webpki roots.
    VerifyCa,
    /// Full certificate and hostname verification.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "prefer" | "" => Ok(SslMode::Prefer),
            "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(CheckError::Config(format!(
                "Invalid sslmode '{}'. Valid values: disable, prefer, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    /// Check if this mode uses TLS at all.
    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

/// Extract the `sslmode` from a connection string.
///
/// Works for both URL (`postgres://...?sslmode=require`) and key/value
/// (`host=... sslmode=require`) forms. Only a real `sslmode` parameter counts;
/// the same text inside a password or another value is left alone. Returns
/// the connection string to hand to tokio-postgres, with verifying modes
/// downgraded to `require`.
pub fn split_ssl_mode(conn_str: &str) -> Result<(String, SslMode)> {
    let span = if is_url(conn_str) {
        url_param_value(conn_str, "sslmode")
    } else {
        key_value_param_value(conn_str, "sslmode")?
    };

    let Some((value_start, value_end)) = span else {
        return Ok((conn_str.to_string(), SslMode::default()));
    };

    let raw = &conn_str[value_start..value_end];
    let value = raw.trim_matches('\'');
    let mode = SslMode::parse(value)?;

    let rewritten = match mode {
        SslMode::VerifyCa | SslMode::VerifyFull => format!(
            "{}require{}",
            &conn_str[..value_start],
            &conn_str[value_end..]
        ),
        _ => conn_str.to_string(),
    };

    Ok((rewritten, mode))
}

fn is_url(conn_str: &str) -> bool {
    conn_str.starts_with("postgres://") || conn_str.starts_with("postgresql://")
}

/// Byte range of a query parameter's value in a connection URL.
///
/// Reserved characters in the userinfo are percent-encoded, so the first `?`
/// starts the query string.
fn url_param_value(url: &str, key: &str) -> Option<(usize, usize)> {
    let query_start = url.find('?')? + 1;
    let query_end = url[query_start..]
        .find('#')
        .map(|i| query_start + i)
        .unwrap_or(url.len());

    let mut offset = query_start;
    for pair in url[query_start..query_end].split('&') {
        if let Some((k, v)) = pair.split_once('=') {
            if k == key {
                let value_start = offset + k.len() + 1;
                return Some((value_start, value_start + v.len()));
            }
        }
        offset += pair.len() + 1;
    }
    None
}

/// Byte range of a parameter's value in a libpq key/value string.
///
/// Values may be single-quoted with backslash escapes; the returned range
/// includes the quotes.
fn key_value_param_value(conn_str: &str, key: &str) -> Result<Option<(usize, usize)>> {
    let bytes = conn_str.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() {
            break;
        }

        let key_start = i;
        while i < bytes.len() && bytes[i] != b'=' && !bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        let found = &conn_str[key_start..i];

        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'=' {
            return Err(CheckError::Config(format!(
                "invalid connection string: missing '=' after {:?}",
                found
            )));
        }
        i += 1;
        while i < bytes.len() && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let value_start = i;
        if i < bytes.len() && bytes[i] == b'\'' {
            i += 1;
            loop {
                match bytes.get(i) {
                    None => {
                        return Err(CheckError::Config(
                            "invalid connection string: unterminated quoted value".to_string(),
                        ))
                    }
                    Some(b'\\') => i += 2,
                    Some(b'\'') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
        } else {
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
        }
        let value_end = i.min(bytes.len());

        if found == key {
            return Ok(Some((value_start, value_end)));
        }
    }

    Ok(None)
}

/// Builder for PostgreSQL TLS connectors.
pub struct TlsBuilder {
    ssl_mode: SslMode,
}

impl TlsBuilder {
    /// Create a new TLS builder with the given SSL mode.
    pub fn new(ssl_mode: SslMode) -> Self {
        Self { ssl_mode }
    }

    /// Build a MakeRustlsConnect instance for use with deadpool-postgres.
    ///
    /// Returns None if TLS is disabled.
    pub fn build(&self) -> Result<Option<MakeRustlsConnect>> {
        if !self.ssl_mode.requires_tls() {
            return Ok(None);
        }

        let config = self.build_client_config()?;
        Ok(Some(MakeRustlsConnect::new(config)))
    }

    /// Build the underlying rustls ClientConfig.
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        let config = match self.ssl_mode {
            SslMode::Disable => {
                return Err(CheckError::Config(
                    "Cannot build TLS config for sslmode=disable".into(),
                ));
            }
            SslMode::Prefer | SslMode::Require => {
                if self.ssl_mode == SslMode::Require {
                    warn!(
                        "sslmode=require enables TLS but does NOT verify the server certificate; \
                         use sslmode=verify-full to verify it"
                    );
                }
                Self::builder()?
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                info!("sslmode={:?}: certificate and hostname verification enabled", self.ssl_mode);
                Self::verifying_builder()?.with_no_client_auth()
            }
        };

        Ok(config)
    }

    fn builder() -> Result<ConfigBuilder<ClientConfig, rustls::WantsVerifier>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| CheckError::Config(format!("Failed to set up TLS: {}", e)))
    }

    fn verifying_builder() -> Result<ConfigBuilder<ClientConfig, WantsClientCert>> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Ok(Self::builder()?.with_root_certificates(root_store))
    }
}

/// Certificate verifier that accepts any certificate.
///
/// Only used for `prefer`/`require`, where TLS encryption is wanted but the
/// certificate is not checked (libpq behaves the same way).
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
