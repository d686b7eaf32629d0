use ed25519_dalek::{Signer, Verifier};
use skein_types::{PrivateKey, System, KEY_TYPE_ED25519};

use crate::error::{CryptoError, CryptoResult};

const SECRET_LEN: usize = ed25519_dalek::SECRET_KEY_LENGTH;
const PUBLIC_LEN: usize = ed25519_dalek::PUBLIC_KEY_LENGTH;
const SIGNATURE_LEN: usize = ed25519_dalek::SIGNATURE_LENGTH;

/// An Ed25519 identity loaded from a wire [`PrivateKey`].
///
/// Remembers the key type it was loaded with so the derived [`System`]
/// carries the same tag.
pub struct Keypair {
    key_type: u64,
    inner: ed25519_dalek::SigningKey,
}

impl Keypair {
    pub fn random() -> Self {
        Self {
            key_type: KEY_TYPE_ED25519,
            inner: ed25519_dalek::SigningKey::generate(&mut rand::thread_rng()),
        }
    }

    pub fn load(private_key: &PrivateKey) -> CryptoResult<Self> {
        let secret: [u8; SECRET_LEN] = private_key.key.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "private key must be {SECRET_LEN} bytes, got {}",
                private_key.key.len()
            ))
        })?;
        Ok(Self {
            key_type: private_key.key_type,
            inner: ed25519_dalek::SigningKey::from_bytes(&secret),
        })
    }

    pub fn private_key(&self) -> PrivateKey {
        PrivateKey::new(self.key_type, self.inner.to_bytes().to_vec())
    }

    pub fn system(&self) -> System {
        System::new(self.key_type, self.inner.verifying_key().to_bytes().to_vec())
    }

    /// Detached 64-byte signature over `message`.
    pub fn sign_bytes(&self, message: &[u8]) -> Vec<u8> {
        self.inner.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("key_type", &self.key_type)
            .field("public", &hex::encode(self.inner.verifying_key().as_bytes()))
            .finish_non_exhaustive()
    }
}

/// Check a detached signature against raw public key bytes.
pub fn check_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> CryptoResult<()> {
    let public: [u8; PUBLIC_LEN] = public_key
        .try_into()
        .map_err(|_| CryptoError::InvalidKey(format!("public key must be {PUBLIC_LEN} bytes")))?;
    let key = ed25519_dalek::VerifyingKey::from_bytes(&public)
        .map_err(|err| CryptoError::InvalidKey(err.to_string()))?;
    let raw: [u8; SIGNATURE_LEN] =
        signature.try_into().map_err(|_| CryptoError::InvalidSignature)?;
    key.verify(message, &ed25519_dalek::Signature::from_bytes(&raw))
        .map_err(|_| CryptoError::InvalidSignature)
}
