//! VAPID key manager (RFC 8292).
//!
//! The signing keypair is read from a PEM file on first use and cached for
//! the life of the process. A missing or malformed file is cached too: push
//! delivery stays disabled until restart, while notifications keep being
//! recorded.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL;
use p256::SecretKey;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::DecodePrivateKey;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("not a P-256 private key in SEC1 or PKCS#8 PEM form")]
    Pem,
}

/// VAPID keypair in the encodings the web-push protocol expects.
///
/// The private key is the raw 32-byte P-256 scalar and the public key the
/// 65-byte uncompressed SEC1 point, both base64url without padding.
#[derive(Clone)]
pub struct VapidKeypair {
    private_key_b64: String,
    public_key_b64: String,
}

impl VapidKeypair {
    /// Parse a PEM-encoded EC private key and derive its public half.
    pub fn from_pem(pem: &str) -> Result<Self, KeyError> {
        let secret = SecretKey::from_sec1_pem(pem)
            .or_else(|_| SecretKey::from_pkcs8_pem(pem))
            .map_err(|_| KeyError::Pem)?;
        Ok(Self::from_secret(&secret))
    }

    pub fn from_secret(secret: &SecretKey) -> Self {
        let public_point = secret.public_key().to_encoded_point(false);
        Self {
            private_key_b64: BASE64URL.encode(&secret.to_bytes()[..]),
            public_key_b64: BASE64URL.encode(public_point.as_bytes()),
        }
    }

    /// Browser-facing `applicationServerKey`.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    pub fn private_key_base64url(&self) -> &str {
        &self.private_key_b64
    }
}

impl std::fmt::Debug for VapidKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeypair")
            .field("public_key", &self.public_key_b64)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Lazily loads and caches the process-wide VAPID keypair.
pub struct KeyManager {
    path: PathBuf,
    keypair: OnceCell<Option<Arc<VapidKeypair>>>,
}

impl KeyManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            keypair: OnceCell::new(),
        }
    }

    /// The cached keypair, loading it on first call.
    ///
    /// Concurrent first callers wait for a single load. Returns `None`
    /// permanently if that load failed.
    pub async fn keypair(&self) -> Option<Arc<VapidKeypair>> {
        self.keypair
            .get_or_init(|| async {
                match Self::load(&self.path).await {
                    Ok(keypair) => {
                        tracing::info!(path = %self.path.display(), "VAPID keypair loaded");
                        Some(Arc::new(keypair))
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %self.path.display(),
                            error = %e,
                            "VAPID keypair unavailable, push delivery disabled"
                        );
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Base64url public key, if the keypair is available.
    pub async fn public_key(&self) -> Option<String> {
        self.keypair()
            .await
            .map(|keypair| keypair.public_key_base64url().to_string())
    }

    async fn load(path: &Path) -> Result<VapidKeypair, KeyError> {
        let pem = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| KeyError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        VapidKeypair::from_pem(&pem)
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("path", &self.path)
            .field("loaded", &self.keypair.initialized())
            .finish()
    }
}
