//! TLS client configuration and the handshake stage of the dial pipeline.
//!
//! Peer verification is on unless explicitly disabled. A verified handshake
//! needs a CA bundle: either the configured path or, on UNIX-like hosts, the
//! first readable entry of a short list of well-known locations. Without a
//! bundle the run fails rather than silently skipping verification.

use std::fs::File;
use std::io::{self, BufReader};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{DigitallySignedStruct, SignatureScheme};
use tokio::net::TcpStream;
use tokio::time;
use tokio_rustls::TlsConnector;

use crate::emitter::Reporter;
use crate::error::{ErrorKind, Result};
use crate::stream::MaybeTlsStream;

// See <https://serverfault.com/a/722646>.
#[cfg(unix)]
const CA_BUNDLE_CANDIDATES: &[&str] = &[
    "/etc/ssl/cert.pem",                  // macOS
    "/etc/ssl/certs/ca-certificates.crt", // Debian
];

/// Wrap `tcp` in TLS when the TLS protocol flag is set; otherwise pass it
/// through untouched.
pub(crate) async fn maybe_wrap(
    rep: &Reporter<'_>,
    hostname: &str,
    tcp: TcpStream,
) -> Result<MaybeTlsStream> {
    if !rep.settings.tls {
        rep.debug("tls: not enabled");
        return Ok(MaybeTlsStream::Plain(tcp));
    }
    let config = client_config(rep)?;
    let connector = TlsConnector::from(Arc::new(config));
    let server_name = ServerName::try_from(hostname.to_string()).map_err(|_| {
        rep.warn("tls: hostname not usable for peer verification");
        ErrorKind::SslGeneric
    })?;
    match time::timeout(
        rep.settings.timeout,
        connector.connect(server_name, tcp),
    )
    .await
    {
        Ok(Ok(stream)) => {
            rep.debug("tls: handshake complete");
            Ok(MaybeTlsStream::Tls(Box::new(stream)))
        }
        Ok(Err(err)) => {
            let kind = map_tls_error(err);
            rep.warn(&format!("tls: handshake failed: {kind}"));
            Err(kind)
        }
        Err(_) => {
            rep.warn("tls: handshake timed out");
            Err(ErrorKind::TimedOut)
        }
    }
}

pub(crate) fn client_config(rep: &Reporter<'_>) -> Result<rustls::ClientConfig> {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|_| ErrorKind::SslGeneric)?;
    if !rep.settings.tls_verify_peer {
        rep.warn("tls: peer verification is disabled; this is insecure");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerification(provider)))
            .with_no_client_auth());
    }
    let Some(bundle) = resolve_ca_bundle(rep) else {
        rep.warn(
            "You did not provide me with a CA bundle path. Without this \
             information I cannot validate the other TLS endpoint. So, \
             I will not continue to run this test.",
        );
        return Err(ErrorKind::InvalidArgument);
    };
    let file = File::open(&bundle).map_err(|_| {
        rep.warn("tls: cannot load the CA bundle path from the file system");
        ErrorKind::SslGeneric
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<io::Result<Vec<_>>>()
        .map_err(|_| {
            rep.warn("tls: cannot parse the CA bundle");
            ErrorKind::SslGeneric
        })?;
    let mut roots = rustls::RootCertStore::empty();
    let (added, _ignored) = roots.add_parsable_certificates(certs);
    if added == 0 {
        rep.warn("tls: the CA bundle contains no usable certificates");
        return Err(ErrorKind::SslGeneric);
    }
    rep.debug(&format!("tls: loaded {added} roots from '{bundle}'"));
    Ok(builder.with_root_certificates(roots).with_no_client_auth())
}

fn resolve_ca_bundle(rep: &Reporter<'_>) -> Option<String> {
    if let Some(path) = &rep.settings.ca_bundle_path {
        return Some(path.clone());
    }
    #[cfg(unix)]
    for candidate in CA_BUNDLE_CANDIDATES {
        if File::open(candidate).is_ok() {
            rep.debug(&format!("tls: using '{candidate}' as CA"));
            return Some(candidate.to_string());
        }
    }
    None
}

fn map_tls_error(err: io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::InvalidData => ErrorKind::SslGeneric,
        io::ErrorKind::UnexpectedEof => ErrorKind::Eof,
        _ => {
            let kind = ErrorKind::from(err);
            if kind == ErrorKind::IoError {
                ErrorKind::SslSyscall
            } else {
                kind
            }
        }
    }
}

/// Certificate verifier that accepts anything. Only reachable when the user
/// turned `tls_verify_peer` off.
#[derive(Debug)]
struct NoVerification(Arc<rustls::crypto::CryptoProvider>);

impl ServerCertVerifier for NoVerification {
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
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
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
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}
