use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use ring::digest::{digest, SHA256};
use tracing::{info, warn};
use wtransport::Identity;

use crate::config::ServerConfig;

// Dev certificate paths (written by the gen-dev-cert binary)
pub const DEV_CERT_DIR: &str = "certs";
const DEV_CERT_FILE: &str = "certs/cert.pem";
const DEV_KEY_FILE: &str = "certs/key.pem";

/// Browsers refuse pinned WebTransport certificates valid for longer
const EPHEMERAL_VALIDITY: Duration = Duration::from_secs(13 * 24 * 60 * 60);

/// TLS identity for the WebTransport endpoint
pub struct TlsConfig {
    pub identity: Identity,
    /// Base64 SHA-256 of the leaf certificate, for `serverCertificateHashes`
    pub cert_hash: String,
}

impl TlsConfig {
    /// Configured paths first, then `certs/`, then a throwaway certificate
    pub async fn load(config: &ServerConfig) -> Result<Self> {
        if let (Some(cert), Some(key)) = (&config.tls_cert_path, &config.tls_key_path) {
            info!("Loading TLS certificate from configured paths");
            return Self::load_from_paths(Path::new(cert), Path::new(key)).await;
        }

        if Path::new(DEV_CERT_FILE).exists() && Path::new(DEV_KEY_FILE).exists() {
            info!("Loading dev certificate from certs/");
            return Self::load_from_paths(Path::new(DEV_CERT_FILE), Path::new(DEV_KEY_FILE)).await;
        }

        warn!("No TLS certificate found; generating an ephemeral localhost certificate");
        let (cert, key) = write_ephemeral_pems(&std::env::temp_dir().join("shoal-arena-certs"))?;
        Self::load_from_paths(&cert, &key).await
    }

    pub async fn load_from_paths(cert_path: &Path, key_path: &Path) -> Result<Self> {
        let identity = Identity::load_pemfiles(cert_path, key_path)
            .await
            .with_context(|| format!("Failed to load certificate from {}", cert_path.display()))?;

        let cert_hash = compute_cert_hash(&identity);
        info!("Certificate hash: {}", cert_hash);

        Ok(Self { identity, cert_hash })
    }
}

fn compute_cert_hash(identity: &Identity) -> String {
    identity
        .certificate_chain()
        .as_slice()
        .first()
        .map(|cert| STANDARD.encode(digest(&SHA256, cert.der()).as_ref()))
        .unwrap_or_default()
}

/// Generate a self-signed localhost certificate into `dir`, returning
/// the certificate and key paths
pub fn write_ephemeral_pems(dir: &Path) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut params = CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])?;
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, "Shoal Arena Dev");
    let now = SystemTime::now();
    params.not_before = now.into();
    params.not_after = (now + EPHEMERAL_VALIDITY).into();

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;

    let cert_path = dir.join("cert.pem");
    let key_path = dir.join("key.pem");
    std::fs::write(&cert_path, cert.pem())?;
    std::fs::write(&key_path, key_pair.serialize_pem())?;
    Ok((cert_path, key_path))
}
