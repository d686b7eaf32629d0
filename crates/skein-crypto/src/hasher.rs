use sha2::{Digest as _, Sha256};
use skein_types::{Digest, Pointer, SignedEvent};

use crate::error::CryptoResult;

/// SHA-256 of `data`.
pub fn digest(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Typed SHA-256 digest of a signed event's encoded event bytes.
pub fn event_digest(signed: &SignedEvent) -> Digest {
    Digest::sha256(digest(&signed.event).to_vec())
}

/// Recompute the pointer that addresses `signed`.
///
/// Decodes the embedded event but does not verify the signature.
pub fn pointer_for(signed: &SignedEvent) -> CryptoResult<Pointer> {
    let event = signed.decode_event()?;
    Ok(Pointer {
        system: event.system,
        process: event.process,
        logical_clock: event.logical_clock,
        event_digest: event_digest(signed),
    })
}
