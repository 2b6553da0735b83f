//! Writes a self-signed localhost certificate to `certs/` for local play.
//! Run with `cargo run --bin gen-dev-cert`.

use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

use shoal_arena_server::net::tls::{write_ephemeral_pems, TlsConfig, DEV_CERT_DIR};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let (cert, key) = write_ephemeral_pems(Path::new(DEV_CERT_DIR))?;
    info!("Certificate saved to {}", cert.display());
    info!("Private key saved to {}", key.display());

    // Browsers pin this hash via serverCertificateHashes
    let tls = TlsConfig::load_from_paths(&cert, &key).await?;
    info!("serverCertificateHashes value: {}", tls.cert_hash);
    Ok(())
}
