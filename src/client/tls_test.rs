use super::*;

fn verifier() -> LoopbackVerifier {
    LoopbackVerifier::new(Arc::new(rustls::crypto::ring::default_provider()))
}

fn verify(name: &str) -> Result<ServerCertVerified, rustls::Error> {
    let server_name = ServerName::try_from(name.to_owned()).unwrap();
    let cert = CertificateDer::from(vec![0u8; 8]);
    verifier().verify_server_cert(&cert, &[], &server_name, &[], UnixTime::now())
}

#[test]
fn loopback_ipv4_accepted() {
    assert!(verify("127.0.0.1").is_ok());
}

#[test]
fn loopback_ipv6_accepted() {
    assert!(verify("::1").is_ok());
}

#[test]
fn localhost_accepted() {
    assert!(verify("localhost").is_ok());
}

#[test]
fn remote_host_rejected() {
    let err = verify("example.com").unwrap_err();
    assert!(matches!(err, rustls::Error::InvalidCertificate(CertificateError::NotValidForName)));
}

#[test]
fn lan_address_rejected() {
    assert!(verify("10.0.0.1").is_err());
}

#[test]
fn advertises_signature_schemes() {
    assert!(!verifier().supported_verify_schemes().is_empty());
}

#[test]
fn config_builds() {
    assert!(loopback_client_config().is_ok());
}
