// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTPS channels over rustls.
//!
//! The rustls client configuration (trust anchors and client certificate)
//! is built once per [`TlsConnector`] and shared by every connection it
//! opens. The handshake is driven to completion inside `connect`, so bad
//! credentials surface as [`ConnectError::Authentication`] rather than as a
//! failure of the first request.

use std::fs;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use rustls::{ClientConnection, RootCertStore, StreamOwned};
use tracing::{debug, warn};

use crate::channel::{
    Channel, ConnectError, Connector, PingStatus, TcpConnector, is_timeout, peek_pending,
};
use crate::config::{ConfigError, Credentials, TlsSettings};

/// Opens TLS channels with the client's credentials.
#[derive(Debug, Clone)]
pub struct TlsConnector {
    tcp: TcpConnector,
    config: Arc<rustls::ClientConfig>,
}

impl TlsConnector {
    pub fn new(settings: &TlsSettings, tcp: TcpConnector) -> Result<Self, ConfigError> {
        Ok(Self {
            tcp,
            config: Arc::new(build_client_config(settings)?),
        })
    }
}

impl Connector for TlsConnector {
    fn connect(&self, host: &str, port: u16) -> Result<Box<dyn Channel>, ConnectError> {
        let addr = format!("{host}:{port}");
        let authentication = |reason: String| ConnectError::Authentication {
            addr: addr.clone(),
            reason,
        };

        let mut sock = self.tcp.open(host, port)?;
        let server_name = ServerName::try_from(host.to_string())
            .map_err(|e| authentication(format!("invalid server name: {e}")))?;
        let mut conn = ClientConnection::new(self.config.clone(), server_name)
            .map_err(|e| authentication(e.to_string()))?;

        while conn.is_handshaking() {
            if let Err(err) = conn.complete_io(&mut sock) {
                let _ = sock.shutdown(Shutdown::Both);
                return Err(if is_timeout(&err) {
                    ConnectError::TimedOut(addr.clone())
                } else {
                    authentication(err.to_string())
                });
            }
        }
        debug!(%addr, "tls handshake complete");

        Ok(Box::new(TlsChannel {
            stream: StreamOwned::new(conn, sock),
        }))
    }
}

/// A TLS session over TCP.
pub struct TlsChannel {
    stream: StreamOwned<ClientConnection, TcpStream>,
}

impl Read for TlsChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TlsChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Channel for TlsChannel {
    fn ping(&mut self) -> PingStatus {
        match peek_pending(&self.stream.sock) {
            Ok(None) => PingStatus::Idle,
            Ok(Some(0)) | Err(_) => PingStatus::PeerClosed,
            Ok(Some(_)) => {
                // Pending records on an idle session are either a close_notify
                // or something the server should not have sent.
                if self.stream.conn.read_tls(&mut self.stream.sock).is_err() {
                    return PingStatus::ProtocolAnomaly;
                }
                match self.stream.conn.process_new_packets() {
                    Ok(state) if state.peer_has_closed() => PingStatus::PeerClosed,
                    _ => PingStatus::ProtocolAnomaly,
                }
            }
        }
    }

    fn shutdown(&mut self) {
        self.stream.conn.send_close_notify();
        while self.stream.conn.wants_write() {
            if self.stream.conn.write_tls(&mut self.stream.sock).is_err() {
                break;
            }
        }
        let _ = self.stream.sock.shutdown(Shutdown::Both);
    }
}

fn build_client_config(settings: &TlsSettings) -> Result<rustls::ClientConfig, ConfigError> {
    let (chain, key, source) = load_credentials(&settings.credentials)?;

    let builder = if settings.dangerous_skip_cert_verification {
        warn!("server certificate verification is disabled");
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification::new()))
    } else {
        rustls::ClientConfig::builder().with_root_certificates(load_trust_anchors(&settings.ca_dir))
    };

    builder
        .with_client_auth_cert(chain, key)
        .map_err(|e| ConfigError::Credentials {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })
}

type ClientIdentity<'a> = (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>, &'a Path);

/// Certificate chain and private key, plus the file reported on errors.
fn load_credentials(credentials: &Credentials) -> Result<ClientIdentity<'_>, ConfigError> {
    match credentials {
        Credentials::None => Err(ConfigError::NoCredentials),
        Credentials::ProxyFile(path) => {
            let pem = read_file(path)?;
            Ok((
                parse_certificates(path, &pem)?,
                parse_private_key(path, &pem)?,
                path.as_path(),
            ))
        }
        Credentials::CertificateAndKey { cert, key } => {
            let chain = parse_certificates(cert, &read_file(cert)?)?;
            let key_pem = read_file(key)?;
            Ok((chain, parse_private_key(key, &key_pem)?, cert.as_path()))
        }
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, ConfigError> {
    fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn parse_certificates(path: &Path, pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ConfigError> {
    let invalid = |reason: String| ConfigError::Credentials {
        path: path.to_path_buf(),
        reason,
    };
    let chain = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(e.to_string()))?;
    if chain.is_empty() {
        return Err(invalid("no certificate found".to_string()));
    }
    Ok(chain)
}

fn parse_private_key(path: &Path, pem: &[u8]) -> Result<PrivateKeyDer<'static>, ConfigError> {
    let invalid = |reason: String| ConfigError::Credentials {
        path: path.to_path_buf(),
        reason,
    };
    rustls_pemfile::private_key(&mut &pem[..])
        .map_err(|e| invalid(e.to_string()))?
        .ok_or_else(|| invalid("no private key found".to_string()))
}

/// Trust anchors from every PEM file in `dir`, or the webpki roots when the
/// directory yields none.
fn load_trust_anchors(dir: &Path) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Ok(pem) = fs::read(&path) else {
                continue;
            };
            for cert in rustls_pemfile::certs(&mut &pem[..]).flatten() {
                let _ = roots.add(cert);
            }
        }
    }
    if roots.is_empty() {
        debug!(dir = %dir.display(), "no CA certificates found, using webpki roots");
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    } else {
        debug!(dir = %dir.display(), count = roots.len(), "loaded CA certificates");
    }
    roots
}

/// Accepts any server certificate while still checking handshake signatures.
#[derive(Debug)]
struct SkipServerVerification(Arc<rustls::crypto::CryptoProvider>);

impl SkipServerVerification {
    fn new() -> Self {
        Self(Arc::new(rustls::crypto::ring::default_provider()))
    }
}

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustls::client::danger::ServerCertVerifier;
    use std::path::PathBuf;

    #[test]
    fn test_missing_credentials_rejected() {
        let err = TlsConnector::new(&TlsSettings::default(), TcpConnector::default()).unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials));
        assert_eq!(
            err.to_string(),
            "Neither TRUSTFILE nor X509_USER_PROXY environment variable set"
        );
    }

    #[test]
    fn test_unreadable_proxy_file() {
        let settings = TlsSettings {
            credentials: Credentials::ProxyFile(PathBuf::from("/nonexistent/x509up")),
            ..Default::default()
        };
        let err = TlsConnector::new(&settings, TcpConnector::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_proxy_file_without_pem_content() {
        let file = tempfile::NamedTempFile::new().unwrap();
        fs::write(file.path(), "not a certificate").unwrap();
        let settings = TlsSettings {
            credentials: Credentials::ProxyFile(file.path().to_path_buf()),
            ..Default::default()
        };
        let err = TlsConnector::new(&settings, TcpConnector::default()).unwrap_err();
        match err {
            ConfigError::Credentials { reason, .. } => assert_eq!(reason, "no certificate found"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_ca_dir_falls_back_to_webpki_roots() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("ca.signing_policy"), "access_id_CA X509").unwrap();
        let roots = load_trust_anchors(dir.path());
        assert_eq!(roots.len(), webpki_roots::TLS_SERVER_ROOTS.len());

        let roots = load_trust_anchors(Path::new("/nonexistent/certificates"));
        assert!(!roots.is_empty());
    }

    #[test]
    fn test_skip_verification_offers_provider_schemes() {
        let verifier = SkipServerVerification::new();
        let schemes = verifier.supported_verify_schemes();
        assert!(schemes.contains(&rustls::SignatureScheme::RSA_PKCS1_SHA256));
        assert!(schemes.contains(&rustls::SignatureScheme::ECDSA_NISTP256_SHA256));
    }
}
