//! HTTP transport for skein replicas.
//!
//! [`HttpGateway`] implements [`skein_sync::ReplicaGateway`] against replica
//! servers that exchange binary-encoded messages. Query parameters carry
//! encoded messages as unpadded URL-safe base64; see [`endpoint`].

pub mod endpoint;
pub mod gateway;

pub use gateway::{HttpGateway, DEFAULT_USER_AGENT, USER_AGENT_HEADER};
