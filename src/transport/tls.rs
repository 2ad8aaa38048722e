//! # TLS Transport Layer
//!
//! Client-side TLS for connections to a distributor.
//!
//! ## Responsibilities
//! - Build a rustls client configuration (platform roots or a PEM CA bundle)
//! - Optional client certificates for mutual TLS
//! - Optional SHA-256 certificate pinning and an insecure development mode
//! - Wrap an established TCP stream before any handshake bytes are written

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::{Certificate, ClientConfig, PrivateKey, RootCertStore, ServerName};
use rustls_pemfile::{certs, pkcs8_private_keys};
use sha2::{Digest, Sha256};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::{debug, instrument, warn};

use crate::error::{constants, ProtocolError, Result};

/// TLS Client Configuration
#[derive(Debug, Clone)]
pub struct TlsClientConfig {
    server_name: String,
    insecure: bool,
    /// Optional PEM bundle replacing the platform root store
    ca_file: Option<String>,
    /// Optional certificate hash to pin (SHA-256 fingerprint)
    pinned_cert_hash: Option<Vec<u8>>,
    /// Optional client certificate path for mTLS
    client_cert_path: Option<String>,
    /// Optional client key path for mTLS
    client_key_path: Option<String>,
}

impl TlsClientConfig {
    /// Create a new TLS client configuration
    pub fn new<S: Into<String>>(server_name: S) -> Self {
        Self {
            server_name: server_name.into(),
            insecure: false,
            ca_file: None,
            pinned_cert_hash: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }

    /// Trust only the roots in a PEM file instead of the platform store
    pub fn with_ca_file<S: Into<String>>(mut self, path: S) -> Self {
        self.ca_file = Some(path.into());
        self
    }

    /// Configure client authentication for mTLS
    pub fn with_client_certificate<S: Into<String>>(mut self, cert_path: S, key_path: S) -> Self {
        self.client_cert_path = Some(cert_path.into());
        self.client_key_path = Some(key_path.into());
        self
    }

    /// Allow insecure connections (skip certificate verification)
    ///
    /// Only for development. Combine with `with_pinned_cert_hash()` to still
    /// verify one specific certificate.
    pub fn insecure(mut self) -> Self {
        warn!("INSECURE MODE ENABLED: Certificate verification is disabled. This should only be used for development/testing.");
        self.insecure = true;
        self
    }

    /// Pin a certificate by its SHA-256 hash/fingerprint
    pub fn with_pinned_cert_hash(mut self, hash: Vec<u8>) -> Self {
        if hash.len() != 32 {
            warn!(
                "Certificate hash has unexpected length: {} (expected 32 bytes for SHA-256)",
                hash.len()
            );
        }
        self.pinned_cert_hash = Some(hash);
        self
    }

    pub fn is_insecure(&self) -> bool {
        self.insecure
    }

    /// Calculate SHA-256 hash for a certificate to use with pinning
    pub fn calculate_cert_hash(cert: &Certificate) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(&cert.0);
        hasher.finalize().to_vec()
    }

    fn load_certificates(path: &str) -> Result<Vec<Certificate>> {
        let file = File::open(path)
            .map_err(|e| ProtocolError::TlsError(format!("Failed to open {path}: {e}")))?;
        let mut reader = BufReader::new(file);
        let raw = certs(&mut reader)
            .map_err(|_| ProtocolError::TlsError(format!("Failed to parse certificates in {path}")))?;
        if raw.is_empty() {
            return Err(ProtocolError::TlsError(format!("No certificates found in {path}")));
        }
        Ok(raw.into_iter().map(Certificate).collect())
    }

    fn load_private_key(path: &str) -> Result<PrivateKey> {
        let file = File::open(path).map_err(ProtocolError::Io)?;
        let mut reader = BufReader::new(file);
        let keys = pkcs8_private_keys(&mut reader)
            .map_err(|_| ProtocolError::TlsError("Failed to parse PKCS8 private key".into()))?;

        keys.into_iter()
            .next()
            .map(PrivateKey)
            .ok_or_else(|| ProtocolError::TlsError("No supported private key format found".into()))
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut root_store = RootCertStore::empty();
        match &self.ca_file {
            Some(path) => {
                for cert in Self::load_certificates(path)? {
                    root_store.add(&cert).map_err(|e| {
                        ProtocolError::TlsError(format!("Failed to add CA cert: {e}"))
                    })?;
                }
            }
            None => {
                let native_certs = rustls_native_certs::load_native_certs().map_err(|e| {
                    ProtocolError::TlsError(format!("Failed to load native certs: {e}"))
                })?;
                for cert in native_certs {
                    // Platform stores routinely contain certificates rustls rejects.
                    if let Err(e) = root_store.add(&Certificate(cert.0)) {
                        debug!(error = %e, "Skipping unusable native root certificate");
                    }
                }
            }
        }
        Ok(root_store)
    }

    fn client_auth(&self) -> Result<Option<(Vec<Certificate>, PrivateKey)>> {
        match (&self.client_cert_path, &self.client_key_path) {
            (Some(cert_path), Some(key_path)) => Ok(Some((
                Self::load_certificates(cert_path)?,
                Self::load_private_key(key_path)?,
            ))),
            _ => Ok(None),
        }
    }

    /// Load the TLS client configuration
    pub fn load_client_config(&self) -> Result<ClientConfig> {
        // The verifier stages return different builder types, so finish each arm separately.
        macro_rules! finish {
            ($builder:expr) => {
                match self.client_auth()? {
                    Some((chain, key)) => $builder.with_client_auth_cert(chain, key).map_err(|e| {
                        ProtocolError::TlsError(format!("Failed to set client certificate: {e}"))
                    })?,
                    None => $builder.with_no_client_auth(),
                }
            };
        }

        let builder = ClientConfig::builder().with_safe_defaults();

        let config = if let Some(hash) = &self.pinned_cert_hash {
            finish!(builder.with_custom_certificate_verifier(Arc::new(CertificateFingerprint {
                fingerprint: hash.clone(),
            })))
        } else if self.insecure {
            finish!(builder.with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert)))
        } else {
            finish!(builder.with_root_certificates(self.root_store()?))
        };

        Ok(config)
    }

    /// Get the server name as a rustls::ServerName
    pub fn server_name(&self) -> Result<ServerName> {
        ServerName::try_from(self.server_name.as_str())
            .map_err(|_| ProtocolError::TlsError(constants::ERR_INVALID_SERVER_NAME.into()))
    }
}

/// Accepts only a server certificate whose SHA-256 matches the pin.
struct CertificateFingerprint {
    fingerprint: Vec<u8>,
}

impl rustls::client::ServerCertVerifier for CertificateFingerprint {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        if TlsClientConfig::calculate_cert_hash(end_entity) == self.fingerprint {
            Ok(rustls::client::ServerCertVerified::assertion())
        } else {
            Err(rustls::Error::General(
                "Pinned certificate hash mismatch".into(),
            ))
        }
    }
}

struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &Certificate,
        _intermediates: &[Certificate],
        _server_name: &ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: std::time::SystemTime,
    ) -> std::result::Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

/// Upgrade an established TCP stream to TLS
#[instrument(skip(stream, config), fields(server_name = %config.server_name))]
pub async fn wrap(stream: TcpStream, config: &TlsClientConfig) -> Result<TlsStream<TcpStream>> {
    let connector = TlsConnector::from(Arc::new(config.load_client_config()?));
    let domain = config.server_name()?;

    let tls_stream = connector
        .connect(domain, stream)
        .await
        .map_err(|e| ProtocolError::TlsError(format!("TLS connection failed: {e}")))?;

    debug!("TLS session established");
    Ok(tls_stream)
}
