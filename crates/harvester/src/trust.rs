//! Decide whether TLS verification should be enforced for a harvest endpoint.
//!
//! The endpoint's live leaf certificate is compared against a locally pinned
//! reference certificate. An endpoint presenting exactly the pinned
//! certificate is the trusted self-hosted mirror and is harvested without
//! verification; every other HTTPS endpoint is verified normally. Any failure
//! on the way yields "do not verify" and is only logged.

use crate::config::HarvesterConfig;
use oaiharvest_common::hash::sha256_fingerprint;
use oaiharvest_common::{Error, Result};
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use openssl::x509::X509;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info};
use url::{Host, Url};

const HTTPS_PORT: u16 = 443;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Which path produced a [`TrustDecision`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustReason {
    /// Plain `http`; no certificate involved.
    PlainTransport,
    /// The endpoint presented the pinned certificate.
    MatchesReference,
    /// The endpoint presented some other certificate.
    DiffersFromReference,
    /// The check failed; carries the error message.
    Fallback(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDecision {
    pub verify: bool,
    pub reason: TrustReason,
}

impl TrustDecision {
    fn new(verify: bool, reason: TrustReason) -> Self {
        Self { verify, reason }
    }
}

/// Leaf certificate presented during a handshake.
#[derive(Debug, Clone)]
pub struct PeerCertificateInfo {
    pub certificate: X509,
    pub peer_addr: SocketAddr,
    pub hostname: String,
}

#[derive(Debug, Clone)]
pub struct CertificateTrustEvaluator {
    reference_certificate: Option<PathBuf>,
    timeout: Duration,
}

impl CertificateTrustEvaluator {
    pub fn new(reference_certificate: impl Into<PathBuf>) -> Self {
        Self {
            reference_certificate: Some(reference_certificate.into()),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &HarvesterConfig) -> Self {
        Self {
            reference_certificate: config.self_certificate_file.clone(),
            timeout: config.connect_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether requests to `url` should verify the server certificate.
    pub fn should_verify(&self, url: &str) -> bool {
        self.evaluate(url).verify
    }

    /// Like [`should_verify`](Self::should_verify), with the reasoning path.
    pub fn evaluate(&self, url: &str) -> TrustDecision {
        match self.try_evaluate(url) {
            Ok(decision) => decision,
            Err(e) => {
                error!(url = %url, error = %e, "Certificate trust check failed");
                TrustDecision::new(false, TrustReason::Fallback(e.to_string()))
            }
        }
    }

    fn try_evaluate(&self, url: &str) -> Result<TrustDecision> {
        let invalid = |reason: &str| Error::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let parsed = Url::parse(url).map_err(|e| invalid(&e.to_string()))?;

        match parsed.scheme() {
            "http" => return Ok(TrustDecision::new(false, TrustReason::PlainTransport)),
            "https" => {}
            other => return Err(invalid(&format!("unsupported scheme '{}'", other))),
        }

        let hostname = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            None => return Err(invalid("missing host")),
        };
        let addrs = resolve(&parsed, self.timeout)?;

        let peer = fetch_peer_certificate(&hostname, &addrs, self.timeout)?;
        let reference = self.load_reference()?;

        let live = peer.certificate.to_der().map_err(certificate_error)?;
        let pinned = reference.to_der().map_err(certificate_error)?;
        debug!(
            host = %peer.hostname,
            peer = %peer.peer_addr,
            live = %sha256_fingerprint(&live),
            pinned = %sha256_fingerprint(&pinned),
            "Comparing endpoint certificate"
        );

        if live == pinned {
            info!(host = %peer.hostname, "Endpoint presents the pinned certificate, skipping verification");
            Ok(TrustDecision::new(false, TrustReason::MatchesReference))
        } else {
            Ok(TrustDecision::new(true, TrustReason::DiffersFromReference))
        }
    }

    fn load_reference(&self) -> Result<X509> {
        let path = self
            .reference_certificate
            .as_ref()
            .ok_or_else(|| Error::Config("no reference certificate configured".to_string()))?;
        let pem = std::fs::read(path).map_err(|e| {
            Error::Certificate(format!("failed to read {}: {}", path.display(), e))
        })?;
        X509::from_pem(&pem).map_err(certificate_error)
    }
}

fn certificate_error(e: openssl::error::ErrorStack) -> Error {
    Error::Certificate(e.to_string())
}

fn tls_error(e: impl std::fmt::Display) -> Error {
    Error::Tls(e.to_string())
}

/// Resolve the host of `url` (port 443 unless given), waiting at most `timeout`.
/// A lookup still running at the deadline is abandoned to its thread.
fn resolve(url: &Url, timeout: Duration) -> Result<Vec<SocketAddr>> {
    let url = url.clone();
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(url.socket_addrs(|| Some(HTTPS_PORT)));
    });
    match rx.recv_timeout(timeout) {
        Ok(addrs) => Ok(addrs?),
        Err(RecvTimeoutError::Timeout) => Err(Error::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "host name lookup timed out",
        ))),
        Err(RecvTimeoutError::Disconnected) => {
            Err(Error::Tls("host name lookup aborted".to_string()))
        }
    }
}

/// Handshake with the first reachable address and return the peer's leaf
/// certificate. Neither the chain nor the host name is verified.
pub fn fetch_peer_certificate(
    hostname: &str,
    addrs: &[SocketAddr],
    timeout: Duration,
) -> Result<PeerCertificateInfo> {
    let stream = connect(addrs, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let peer_addr = stream.peer_addr()?;

    let mut builder = SslConnector::builder(SslMethod::tls()).map_err(tls_error)?;
    builder.set_verify(SslVerifyMode::NONE);
    let connector = builder.build();
    let config = connector.configure().map_err(tls_error)?.verify_hostname(false);

    let mut tls = config.connect(hostname, stream).map_err(tls_error)?;
    let certificate = tls.ssl().peer_certificate();
    let _ = tls.shutdown();

    let certificate = certificate
        .ok_or_else(|| Error::Certificate("peer presented no certificate".to_string()))?;
    Ok(PeerCertificateInfo {
        certificate,
        peer_addr,
        hostname: hostname.to_string(),
    })
}

fn connect(addrs: &[SocketAddr], timeout: Duration) -> Result<TcpStream> {
    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                debug!(addr = %addr, error = %e, "Connection attempt failed");
                last_error = Some(e);
            }
        }
    }
    Err(match last_error {
        Some(e) => Error::Io(e),
        None => Error::Tls("host resolved to no addresses".to_string()),
    })
}
