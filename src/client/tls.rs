//! TLS trust for the Client's self-signed loopback certificate.
//!
//! DESIGN
//! ======
//! The Client serves HTTPS and WSS on 127.0.0.1 with a certificate no
//! public root signs. Trust is relaxed for loopback peers only: the
//! verifier accepts the certificate when the server name is a loopback IP
//! or `localhost`, still checks the handshake signatures against the
//! presented certificate, and rejects every other peer. The same
//! `ClientConfig` backs both the reqwest gateway and the tungstenite
//! event stream.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, DigitallySignedStruct, SignatureScheme};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum TlsSetupError {
    #[error("tls configuration failed: {0}")]
    Config(#[from] rustls::Error),
}

/// Certificate verifier that trusts loopback peers only.
#[derive(Debug)]
pub struct LoopbackVerifier {
    provider: Arc<CryptoProvider>,
}

impl LoopbackVerifier {
    #[must_use]
    pub fn new(provider: Arc<CryptoProvider>) -> Self {
        Self { provider }
    }
}

/// True when `name` addresses this machine.
#[must_use]
pub fn is_loopback_name(name: &ServerName<'_>) -> bool {
    match name {
        ServerName::IpAddress(ip) => std::net::IpAddr::from(*ip).is_loopback(),
        ServerName::DnsName(dns) => dns.as_ref().eq_ignore_ascii_case("localhost"),
        _ => false,
    }
}

impl ServerCertVerifier for LoopbackVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if is_loopback_name(server_name) {
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(?server_name, "tls: refusing non-loopback peer");
            Err(rustls::Error::InvalidCertificate(CertificateError::NotValidForName))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider.signature_verification_algorithms.supported_schemes()
    }
}

/// Build the client TLS config used for every connection to the Client.
///
/// # Errors
///
/// Returns an error if the ring provider rejects the default protocol set.
pub fn loopback_client_config() -> Result<Arc<ClientConfig>, TlsSetupError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(LoopbackVerifier::new(provider.clone()));
    let config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

#[cfg(test)]
#[path = "tls_test.rs"]
mod tests;
