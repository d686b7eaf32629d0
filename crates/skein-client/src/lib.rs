//! # skein-client
//!
//! Session layer over the skein synchronization engine: signing in and out,
//! posting under a per-client write lock, managing the replica list and the
//! result cache, and persisting all of it through a [`StateStore`].

pub mod client;
pub mod config;
pub mod error;
pub mod state;

pub use client::{Client, PostReceipt};
pub use config::{ClientConfig, DEFAULT_SERVER};
pub use error::{ClientError, ClientResult};
pub use state::{Account, ClientState, InMemoryStateStore, JsonFileStore, StateStore};
