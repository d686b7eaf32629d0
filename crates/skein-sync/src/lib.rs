//! Synchronization engine for skein.
//!
//! Fans every read out to all configured replicas, verifies what comes back
//! against the expected identity, and reconciles untrusted answers into
//! ordered, deduplicated results. Writes start from
//! [`SyncEngine::find_or_create_post_head`], which rebuilds a safe write head
//! purely from replica data.
//!
//! Per-replica failures never fail an operation; only a fan-out where every
//! replica failed surfaces as [`SyncError::NoReplicaResponded`].

pub mod blob;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod post;
pub mod verifier;

#[cfg(test)]
mod fixtures;

pub use blob::{avatar_cache_key, reassemble};
pub use bootstrap::{reconcile_indices, Bootstrap};
pub use cache::{CacheEntry, InMemoryCache, ResultCache};
pub use config::SyncConfig;
pub use engine::{now_ms, sort_newest_first, PostOutcome, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use gateway::{Replica, ReplicaGateway, ReplicaSet};
pub use memory::InMemoryReplicas;
pub use post::create_signed_post_event;
pub use verifier::{
    ReplicaFailure, SyncVerifier, VerificationReport, Verified, Violation, ViolationKind,
};
