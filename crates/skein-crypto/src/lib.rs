//! Cryptographic identity for skein.
//!
//! Ed25519 keys (via `ed25519-dalek`), event signing over the exact encoded
//! event bytes, signature checks that report a [`Rejection`] rather than an
//! error, and SHA-256 event digests for pointers.

pub mod error;
pub mod hasher;
pub mod identity;
pub mod signer;

pub use error::{CryptoError, CryptoResult};
pub use hasher::{digest, event_digest, pointer_for};
pub use identity::{
    derive_public_key, generate_private_key, open_for_system, open_self_signed, random_process_id,
    sign, sign_event, verify, Rejection,
};
pub use signer::{check_signature, Keypair};
