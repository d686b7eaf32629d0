use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use skein_types::{QueryReferencesResponse, RangesForSystem, Reference, SignedEvent, SignedEvents, System};

use crate::error::SyncResult;

/// Base URL of a replica server, without a trailing `/`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Replica(String);

impl Replica {
    pub fn new(url: impl AsRef<str>) -> Self {
        let url = url.as_ref().trim();
        Self(url.strip_suffix('/').unwrap_or(url).to_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Replica {
    fn from(url: String) -> Self {
        Self::new(url)
    }
}

impl From<&str> for Replica {
    fn from(url: &str) -> Self {
        Self::new(url)
    }
}

impl From<Replica> for String {
    fn from(replica: Replica) -> Self {
        replica.0
    }
}

impl fmt::Display for Replica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-replica operations the engine fans out over.
///
/// Implementations report transport problems as `Err`; they never verify
/// signatures, which is the engine's job.
#[async_trait]
pub trait ReplicaGateway: Send + Sync {
    async fn post_events(&self, replica: &Replica, events: &SignedEvents) -> SyncResult<()>;

    async fn get_head(&self, replica: &Replica, system: &System) -> SyncResult<Vec<SignedEvent>>;

    async fn get_events(
        &self,
        replica: &Replica,
        system: &System,
        ranges: &RangesForSystem,
    ) -> SyncResult<Vec<SignedEvent>>;

    async fn get_query_latest(
        &self,
        replica: &Replica,
        system: &System,
        content_types: &[u64],
    ) -> SyncResult<Vec<SignedEvent>>;

    async fn get_query_references(
        &self,
        replica: &Replica,
        reference: &Reference,
        cursor: Option<&[u8]>,
        content_type: u64,
    ) -> SyncResult<QueryReferencesResponse>;
}

/// Shared, mutable list of replicas an engine talks to.
#[derive(Clone, Debug, Default)]
pub struct ReplicaSet {
    replicas: Arc<RwLock<Vec<Replica>>>,
}

impl ReplicaSet {
    pub fn new(replicas: impl IntoIterator<Item = Replica>) -> Self {
        let set = Self::default();
        for replica in replicas {
            set.add(replica);
        }
        set
    }

    pub fn snapshot(&self) -> Vec<Replica> {
        self.replicas.read().expect("lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.replicas.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, replica: &Replica) -> bool {
        self.replicas.read().expect("lock poisoned").contains(replica)
    }

    /// Add a replica. Returns `false` if it was already present.
    pub fn add(&self, replica: Replica) -> bool {
        let mut replicas = self.replicas.write().expect("lock poisoned");
        if replicas.contains(&replica) {
            return false;
        }
        replicas.push(replica);
        true
    }

    /// Remove a replica. Returns `false` if it was not present.
    pub fn remove(&self, replica: &Replica) -> bool {
        let mut replicas = self.replicas.write().expect("lock poisoned");
        let before = replicas.len();
        replicas.retain(|r| r != replica);
        replicas.len() != before
    }

    pub fn replace(&self, replicas: Vec<Replica>) {
        *self.replicas.write().expect("lock poisoned") = replicas;
    }
}
