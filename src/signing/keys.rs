//! Signing key provisioning.
//!
//! On first start a fresh Ed25519 key pair is written below the data
//! directory; afterwards the stored pair is loaded and cross-checked. The
//! public key is logged so it can be handed to response verifiers.

use std::fs;
use std::path::Path;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use thiserror::Error;

use crate::config::SigningConfig;
use crate::signing::signer::{decode_public_key, Ed25519Signer, SigningError};

/// Errors that prevent the signing key pair from being prepared.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{present} signing key exists but {missing} key is missing")]
    Inconsistent {
        present: &'static str,
        missing: &'static str,
    },

    #[error("stored public key does not match the private key")]
    PublicKeyMismatch,

    #[error(transparent)]
    Signing(#[from] SigningError),
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> KeyError + '_ {
    move |source| KeyError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Load the configured key pair, generating it when neither file exists.
pub fn prepare_signing_keys(config: &SigningConfig) -> Result<Ed25519Signer, KeyError> {
    for dir in [
        config.public_key_path.parent(),
        config.private_key_path.parent(),
    ]
    .into_iter()
    .flatten()
    {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            tracing::info!(path = %dir.display(), "Creating signing key directory");
            fs::create_dir_all(dir).map_err(io_err(dir))?;
        }
    }

    let public_exists = config.public_key_path.exists();
    let private_exists = config.private_key_path.exists();

    let signer = match (public_exists, private_exists) {
        (false, false) => {
            tracing::info!("Generating new Ed25519 signing key pair");
            let signer = Ed25519Signer::new(SigningKey::generate(&mut OsRng));
            write_key(
                &config.public_key_path,
                signer.verifying_key().as_bytes(),
                0o644,
            )?;
            tracing::info!(path = %config.public_key_path.display(), "Public key saved");
            write_key(&config.private_key_path, &signer.to_keypair_bytes(), 0o600)?;
            tracing::info!(path = %config.private_key_path.display(), "Private key saved");
            signer
        }
        (true, false) => {
            return Err(KeyError::Inconsistent {
                present: "public",
                missing: "private",
            })
        }
        (false, true) => {
            return Err(KeyError::Inconsistent {
                present: "private",
                missing: "public",
            })
        }
        (true, true) => {
            tracing::info!("Using existing Ed25519 signing key pair");
            let signer = Ed25519Signer::load(&config.private_key_path)?;
            let stored =
                fs::read(&config.public_key_path).map_err(io_err(&config.public_key_path))?;
            if decode_public_key(&stored)? != signer.verifying_key() {
                return Err(KeyError::PublicKeyMismatch);
            }
            signer
        }
    };

    tracing::info!(
        public_key = %signer.public_key_base64(),
        "Signing public key (base64)"
    );
    Ok(signer)
}

fn write_key(path: &Path, bytes: &[u8], mode: u32) -> Result<(), KeyError> {
    fs::write(path, bytes).map_err(io_err(path))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(io_err(path))?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signing::Signer;

    fn layout(dir: &Path) -> SigningConfig {
        SigningConfig::under(dir)
    }

    #[test]
    fn generates_then_reloads_same_pair() {
        let dir = tempfile::tempdir().unwrap();
        let config = layout(dir.path());

        let first = prepare_signing_keys(&config).unwrap();
        assert_eq!(fs::read(&config.public_key_path).unwrap().len(), 32);
        assert_eq!(fs::read(&config.private_key_path).unwrap().len(), 64);

        let second = prepare_signing_keys(&config).unwrap();
        assert_eq!(first.public_key_base64(), second.public_key_base64());
        assert_eq!(first.sign(b"body").unwrap(), second.sign(b"body").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let config = layout(dir.path());
        prepare_signing_keys(&config).unwrap();

        let mode = fs::metadata(&config.private_key_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn half_present_pair_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = layout(dir.path());
        prepare_signing_keys(&config).unwrap();
        fs::remove_file(&config.private_key_path).unwrap();

        assert!(matches!(
            prepare_signing_keys(&config),
            Err(KeyError::Inconsistent { present: "public", .. })
        ));
    }

    #[test]
    fn truncated_private_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = layout(dir.path());
        prepare_signing_keys(&config).unwrap();
        fs::write(&config.private_key_path, [1u8; 32]).unwrap();

        assert!(matches!(
            prepare_signing_keys(&config),
            Err(KeyError::Signing(SigningError::KeySize { expected: 64, actual: 32 }))
        ));
    }

    #[test]
    fn foreign_public_key_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = layout(dir.path());
        prepare_signing_keys(&config).unwrap();

        let other = SigningKey::from_bytes(&[9u8; 32]);
        fs::write(&config.public_key_path, other.verifying_key().as_bytes()).unwrap();

        assert!(matches!(
            prepare_signing_keys(&config),
            Err(KeyError::PublicKeyMismatch)
        ));
    }
}
