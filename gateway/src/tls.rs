//! TLS certificate/key loading for the direct HTTPS endpoint.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use gateway_core::GatewayError;
use rustls::ServerConfig;
use rustls_pki_types::PrivateKeyDer;

/// Load a `rustls::ServerConfig` from a PEM cert chain and private key.
/// Tries PKCS8 first, falling back to RSA/PKCS1, matching how most
/// `certbot`/`mkcert`-issued key files are encoded.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, GatewayError> {
    let cert_chain = {
        let mut reader = BufReader::new(File::open(cert_path)?);
        rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::Tls(format!("invalid certificate at {cert_path:?}: {e}")))?
    };

    let key = load_private_key(key_path)?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| GatewayError::Tls(format!("invalid certificate/key pair: {e}")))?;

    Ok(Arc::new(config))
}

fn load_private_key(key_path: &Path) -> Result<PrivateKeyDer<'static>, GatewayError> {
    let mut reader = BufReader::new(File::open(key_path)?);
    let pkcs8 = rustls_pemfile::pkcs8_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("invalid PKCS8 key at {key_path:?}: {e}")))?;
    if let Some(key) = pkcs8.into_iter().next() {
        return Ok(PrivateKeyDer::Pkcs8(key));
    }

    let mut reader = BufReader::new(File::open(key_path)?);
    let rsa = rustls_pemfile::rsa_private_keys(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls(format!("invalid RSA key at {key_path:?}: {e}")))?;
    if let Some(key) = rsa.into_iter().next() {
        return Ok(PrivateKeyDer::Pkcs1(key));
    }

    Err(GatewayError::Tls(format!("no private key found in {key_path:?}")))
}
