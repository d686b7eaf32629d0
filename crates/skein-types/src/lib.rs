//! # skein-types
//!
//! The event model: identities, processes, clocks, events, pointers and the
//! payloads carried inside events, each bound to its wire schema through
//! [`WireMessage`].
//!
//! Everything here is pure data. Signing and hashing live in `skein-crypto`;
//! network reconciliation lives in `skein-sync`.

pub mod clock;
pub mod content;
pub mod error;
pub mod event;
pub mod head;
pub mod identity;
pub mod payload;
pub mod query;
pub mod schemas;
mod wire;

pub use clock::{clock_after, Index, Indices, VectorClock};
pub use content::{ContentType, DIGEST_TYPE_SHA256, REFERENCE_TYPE_BLOB, REFERENCE_TYPE_POINTER};
pub use error::{TypeError, TypeResult};
pub use event::{
    ChunkKey, Digest, Event, EventKey, LwwElement, LwwElementSet, Pointer, Reference, SignedEvent,
    SignedEvents,
};
pub use head::PostHead;
pub use identity::{PrivateKey, Process, System, KEY_TYPE_ED25519, PROCESS_ID_LEN};
pub use payload::{
    DecodedImage, DecodedImages, ImageBundle, ImageManifest, Numbers, Post, Range, RangesForProcess,
    RangesForSystem, SystemProcesses,
};
pub use query::{
    CountLwwElementReferences, CountReferences, QueryReferencesEvents, QueryReferencesItem,
    QueryReferencesRequest, QueryReferencesResponse,
};
pub use wire::WireMessage;
