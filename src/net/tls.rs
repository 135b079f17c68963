//! TLS configuration and certificate loading.
//!
//! A fresh deployment gets a self-signed certificate written to the
//! configured paths; later starts reuse it.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;
use rcgen::{CertificateParams, DnType, ExtendedKeyUsagePurpose, KeyPair};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::TlsConfig;

const SELF_SIGNED_NAME: &str = "license-gate";

/// Errors raised while provisioning the listener certificate.
#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS {present} exists but {missing} is missing")]
    Inconsistent {
        present: &'static str,
        missing: &'static str,
    },

    #[error("failed to generate self-signed certificate: {0}")]
    Generate(#[from] rcgen::Error),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> CertificateError + '_ {
    move |source| CertificateError::Io {
        path: path.display().to_string(),
        source,
    }
}

fn ensure_exists(path: &Path, what: &str) -> Result<(), std::io::Error> {
    if path.exists() {
        Ok(())
    } else {
        Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} file not found: {:?}", what, path),
        ))
    }
}

/// Make sure a certificate and key exist, generating a self-signed pair
/// when neither file is present. Returns `true` if a pair was generated.
pub fn prepare_certificate(config: &TlsConfig) -> Result<bool, CertificateError> {
    for dir in [config.cert_path.parent(), config.key_path.parent()]
        .into_iter()
        .flatten()
    {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            tracing::info!(path = %dir.display(), "Creating TLS directory");
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
    }

    match (config.cert_path.exists(), config.key_path.exists()) {
        (true, true) => {
            tracing::info!(path = %config.cert_path.display(), "Using existing TLS certificate");
            Ok(false)
        }
        (true, false) => Err(CertificateError::Inconsistent {
            present: "certificate",
            missing: "private key",
        }),
        (false, true) => Err(CertificateError::Inconsistent {
            present: "private key",
            missing: "certificate",
        }),
        (false, false) => {
            tracing::info!("Generating new self-signed TLS certificate");
            let (cert_pem, key_pem) = self_signed_pem()?;

            fs::write(&config.key_path, key_pem).map_err(io_err(&config.key_path))?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&config.key_path, fs::Permissions::from_mode(0o600))
                    .map_err(io_err(&config.key_path))?;
            }
            fs::write(&config.cert_path, cert_pem).map_err(io_err(&config.cert_path))?;

            tracing::info!(path = %config.cert_path.display(), "Self-signed certificate saved");
            Ok(true)
        }
    }
}

/// PEM certificate and PKCS#8 key for a server certificate valid for the
/// loopback address.
fn self_signed_pem() -> Result<(String, String), rcgen::Error> {
    let mut params = CertificateParams::new(vec![
        SELF_SIGNED_NAME.to_string(),
        "127.0.0.1".to_string(),
    ])?;
    params
        .distinguished_name
        .push(DnType::OrganizationName, "License Gate Self Signed Cert");
    params
        .distinguished_name
        .push(DnType::CommonName, SELF_SIGNED_NAME);
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];

    let key_pair = KeyPair::generate()?;
    let cert = params.self_signed(&key_pair)?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(
    cert_path: &Path,
    key_path: &Path,
) -> Result<RustlsConfig, std::io::Error> {
    ensure_exists(cert_path, "Certificate")?;
    ensure_exists(key_path, "Private key")?;

    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Upper-case hex SHA-256 of the first certificate in a PEM file.
pub fn certificate_fingerprint(cert_path: &Path) -> Result<String, std::io::Error> {
    ensure_exists(cert_path, "Certificate")?;

    let mut reader = BufReader::new(File::open(cert_path)?);
    let cert = rustls_pemfile::certs(&mut reader)
        .next()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("no PEM certificate in {:?}", cert_path),
            )
        })??;

    Ok(hex::encode_upper(Sha256::digest(cert.as_ref())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine};
    use std::io::Write;

    fn pem_file(der: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "-----BEGIN CERTIFICATE-----").unwrap();
        writeln!(file, "{}", STANDARD.encode(der)).unwrap();
        writeln!(file, "-----END CERTIFICATE-----").unwrap();
        file
    }

    #[test]
    fn fingerprint_hashes_der_bytes() {
        let der = b"not really a certificate but DER-shaped enough";
        let file = pem_file(der);

        let fingerprint = certificate_fingerprint(file.path()).unwrap();
        assert_eq!(fingerprint, hex::encode_upper(Sha256::digest(der)));
        assert_eq!(fingerprint.len(), 64);
    }

    #[test]
    fn fingerprint_requires_a_certificate() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "no pem here").unwrap();
        let err = certificate_fingerprint(file.path()).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn missing_files_are_not_found() {
        let err = load_tls_config(
            Path::new("/nonexistent/cert.pem"),
            Path::new("/nonexistent/key.pem"),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn generates_pair_once_then_reuses_it() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::under(dir.path());

        assert!(prepare_certificate(&config).unwrap());
        let first = certificate_fingerprint(&config.cert_path).unwrap();
        let key = fs::read_to_string(&config.key_path).unwrap();
        assert!(key.contains("PRIVATE KEY"));

        assert!(!prepare_certificate(&config).unwrap());
        assert_eq!(certificate_fingerprint(&config.cert_path).unwrap(), first);
    }

    #[cfg(unix)]
    #[test]
    fn generated_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::under(dir.path());
        prepare_certificate(&config).unwrap();

        let mode = fs::metadata(&config.key_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn half_present_pair_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::under(dir.path());
        prepare_certificate(&config).unwrap();
        fs::remove_file(&config.key_path).unwrap();

        let err = prepare_certificate(&config).unwrap_err();
        assert!(matches!(
            err,
            CertificateError::Inconsistent {
                present: "certificate",
                ..
            }
        ));
        assert!(!config.key_path.exists());
    }

    #[tokio::test]
    async fn generated_pair_loads_into_rustls() {
        let dir = tempfile::tempdir().unwrap();
        let config = TlsConfig::under(dir.path());
        prepare_certificate(&config).unwrap();

        load_tls_config(&config.cert_path, &config.key_path)
            .await
            .unwrap();
    }
}
