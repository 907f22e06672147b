//! Connection pools and TLS setup for both PostgreSQL databases.

use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::config::{redact_url, DatabaseConfig};
use crate::error::{MigrateError, Result};

/// `DATABASE_SSL_MODE` values, named after libpq's `sslmode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    Disable,
    /// Encrypted, server certificate unchecked. The LMS hosts default to this.
    #[default]
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" => Ok(SslMode::Disable),
            "require" | "" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MigrateError::Config(format!(
                "Invalid ssl_mode '{}'. Valid values: disable, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    /// Connector for the pool manager, or `None` for plaintext.
    pub fn connector(self) -> Result<Option<MakeRustlsConnect>> {
        let verifier = match self {
            SslMode::Disable => return Ok(None),
            SslMode::Require => {
                warn!("ssl_mode=require: server certificate is not checked, use verify-full to check it");
                None
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                info!("ssl_mode={:?}: checking server certificate against webpki roots", self);
                Some(webpki_root_store())
            }
        };

        let builder =
            ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
                .with_safe_default_protocol_versions()
                .map_err(|e| MigrateError::Config(format!("TLS setup failed: {}", e)))?;

        let config = match verifier {
            Some(roots) => builder.with_root_certificates(roots).with_no_client_auth(),
            None => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
                .with_no_client_auth(),
        };

        Ok(Some(MakeRustlsConnect::new(config)))
    }
}

fn webpki_root_store() -> RootCertStore {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    roots
}

/// Create a connection pool for one of the two databases.
///
/// `label` names the database in errors and logs ("source" or "target").
pub fn build_pool(db: &DatabaseConfig, max_conns: usize, label: &str) -> Result<Pool> {
    let pg_config: PgConfig = db.url.parse().map_err(|e| {
        MigrateError::Config(format!(
            "invalid {} database URL {}: {}",
            label,
            redact_url(&db.url),
            e
        ))
    })?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = match SslMode::parse(&db.ssl_mode)?.connector()? {
        Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        None => {
            warn!(
                "PostgreSQL TLS is disabled for the {} database. Credentials will be transmitted in plaintext.",
                label
            );
            Manager::from_config(pg_config, NoTls, mgr_config)
        }
    };

    Pool::builder(mgr)
        .max_size(max_conns)
        .build()
        .map_err(|e| MigrateError::pool(e, format!("creating {} pool", label)))
}

/// Verifier behind `ssl_mode=require`.
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
