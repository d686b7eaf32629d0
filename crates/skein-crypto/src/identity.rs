use std::fmt;

use rand::RngCore;
use skein_types::{
    Event, PrivateKey, Process, SignedEvent, System, TypeError, WireMessage, PROCESS_ID_LEN,
};

use crate::error::CryptoResult;
use crate::signer::{check_signature, Keypair};

/// A fresh random Ed25519 private key.
pub fn generate_private_key() -> PrivateKey {
    Keypair::random().private_key()
}

/// The public system for a private key. The key type is carried over.
pub fn derive_public_key(private_key: &PrivateKey) -> CryptoResult<System> {
    Ok(Keypair::load(private_key)?.system())
}

/// Sign encoded event bytes.
pub fn sign(private_key: &PrivateKey, message: &[u8]) -> CryptoResult<Vec<u8>> {
    Ok(Keypair::load(private_key)?.sign_bytes(message))
}

/// Check `signature` over `message` against raw public key bytes.
///
/// Malformed keys or signatures simply fail verification.
pub fn verify(signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
    check_signature(public_key, message, signature).is_ok()
}

/// 16 random bytes for a new process.
pub fn random_process_id() -> Process {
    let mut bytes = vec![0u8; PROCESS_ID_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    Process::new(bytes)
}

/// Encode `event` and sign exactly the encoded bytes.
pub fn sign_event(private_key: &PrivateKey, event: &Event) -> CryptoResult<SignedEvent> {
    let encoded = event.encode()?;
    let signature = sign(private_key, &encoded)?;
    Ok(SignedEvent::new(signature, encoded))
}

/// Why a signed event was not accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The signature does not verify against the expected key.
    BadSignature,
    /// The event bytes do not decode.
    Malformed(TypeError),
    /// Correctly signed, but by a different system than the one asked for.
    ForeignSystem,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::BadSignature => f.write_str("signature does not verify"),
            Rejection::Malformed(err) => write!(f, "malformed event: {err}"),
            Rejection::ForeignSystem => f.write_str("event belongs to another system"),
        }
    }
}

/// Verify `signed` against a known `system`, then decode it.
pub fn open_for_system(system: &System, signed: &SignedEvent) -> Result<Event, Rejection> {
    if !verify(&signed.signature, &signed.event, &system.key) {
        return Err(Rejection::BadSignature);
    }
    let event = signed.decode_event().map_err(Rejection::Malformed)?;
    if event.system != *system {
        return Err(Rejection::ForeignSystem);
    }
    Ok(event)
}

/// Decode `signed` and verify it against the system it claims to be from.
pub fn open_self_signed(signed: &SignedEvent) -> Result<Event, Rejection> {
    let event = signed.decode_event().map_err(Rejection::Malformed)?;
    if !verify(&signed.signature, &signed.event, &event.system.key) {
        return Err(Rejection::BadSignature);
    }
    Ok(event)
}
