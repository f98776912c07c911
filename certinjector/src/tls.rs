use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, RwLock};

use certinjector_common::errors::CertInjectorError;
use certinjector_macros::{ci_log, logger, with_dollar_sign};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::{any_supported_type, CertifiedKey};
use rustls::{Certificate, PrivateKey, ServerConfig};
use rustls_pemfile::{certs, pkcs8_private_keys, rsa_private_keys};

logger!("TLS");

fn load_certs(cert_file: &str) -> Result<Vec<Certificate>, CertInjectorError> {
    let mut cert_reader = BufReader::new(
        File::open(cert_file).map_err(CertInjectorError::from_error("Unable to open cert file"))?,
    );
    let certs: Vec<Certificate> = certs(&mut cert_reader)
        .map_err(CertInjectorError::from_error("Unable to load certificates"))?
        .into_iter()
        .map(Certificate)
        .collect();
    if certs.is_empty() {
        return Err(CertInjectorError::from_string(format!(
            "No certificates found in {}",
            cert_file
        )));
    }
    Ok(certs)
}

fn load_key(key_file: &str) -> Result<PrivateKey, CertInjectorError> {
    let open = || {
        File::open(key_file)
            .map(BufReader::new)
            .map_err(CertInjectorError::from_error("Unable to open key file"))
    };
    let mut keys = pkcs8_private_keys(&mut open()?)
        .map_err(CertInjectorError::from_error("Unable to load keys"))?;
    if keys.is_empty() {
        keys = rsa_private_keys(&mut open()?)
            .map_err(CertInjectorError::from_error("Unable to load keys"))?;
    }
    keys.into_iter()
        .next()
        .map(PrivateKey)
        .ok_or_else(|| CertInjectorError::from_string(format!("No keys found in {}", key_file)))
}

/// Reads the certificate chain and private key from the given PEM files.
pub fn load_certified_key(
    cert_file: &str,
    key_file: &str,
) -> Result<CertifiedKey, CertInjectorError> {
    let certs = load_certs(cert_file)?;
    let key = load_key(key_file)?;
    let signing_key = any_supported_type(&key)
        .map_err(CertInjectorError::from_error("Unsupported private key"))?;
    Ok(CertifiedKey::new(certs, signing_key))
}

/// Serves the certificate currently on disk. The files are only read again on
/// `reload`, a failed reload keeps serving the previous certificate.
pub struct ReloadableCertResolver {
    cert_file: String,
    key_file: String,
    key: RwLock<Arc<CertifiedKey>>,
}

impl ReloadableCertResolver {
    pub fn new(cert_file: &str, key_file: &str) -> Result<Self, CertInjectorError> {
        let key = load_certified_key(cert_file, key_file)?;
        Ok(ReloadableCertResolver {
            cert_file: cert_file.to_string(),
            key_file: key_file.to_string(),
            key: RwLock::new(Arc::new(key)),
        })
    }

    pub fn cert_file(&self) -> &str {
        &self.cert_file
    }

    pub fn key_file(&self) -> &str {
        &self.key_file
    }

    pub fn reload(&self) -> Result<(), CertInjectorError> {
        let key = load_certified_key(&self.cert_file, &self.key_file)?;
        let mut current = self
            .key
            .write()
            .map_err(|_| CertInjectorError::from("Certificate lock poisoned"))?;
        *current = Arc::new(key);
        info!("Loaded certificate from {}", self.cert_file);
        Ok(())
    }

    fn current(&self) -> Option<Arc<CertifiedKey>> {
        self.key.read().ok().map(|key| Arc::clone(&key))
    }
}

impl fmt::Debug for ReloadableCertResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReloadableCertResolver")
            .field("cert_file", &self.cert_file)
            .field("key_file", &self.key_file)
            .finish()
    }
}

impl ResolvesServerCert for ReloadableCertResolver {
    fn resolve(&self, _client_hello: ClientHello) -> Option<Arc<CertifiedKey>> {
        self.current()
    }
}

pub fn server_config(resolver: Arc<ReloadableCertResolver>) -> ServerConfig {
    ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_cert_resolver(resolver)
}
