//! Self-signed TLS material for transport tests.

use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};

#[derive(Debug)]
pub struct TlsTestAssets {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub cert_der: CertificateDer<'static>,
    pub server_name: String,
}

/// Write a self-signed certificate for `localhost` and its key into `dir`.
#[allow(dead_code)]
pub fn generate_tls_assets(dir: &Path) -> anyhow::Result<TlsTestAssets> {
    let mut params = CertificateParams::new(vec!["localhost".to_string()])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "ringcast-test");
    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    let cert_path = dir.join("server.pem");
    let key_path = dir.join("server.key");
    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;

    Ok(TlsTestAssets {
        cert_path,
        key_path,
        cert_der: cert.der().clone(),
        server_name: "localhost".to_string(),
    })
}

/// A connector that trusts only the generated certificate.
#[allow(dead_code)]
pub fn connector(assets: &TlsTestAssets) -> anyhow::Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.add(assets.cert_der.clone())?;
    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}
