use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use skein_types::{
    Event, Process, QueryReferencesItem, QueryReferencesResponse, RangesForSystem, Reference,
    SignedEvent, SignedEvents, System,
};

use crate::error::{SyncError, SyncResult};
use crate::gateway::{Replica, ReplicaGateway};

#[derive(Clone)]
struct Stored {
    event: Event,
    signed: SignedEvent,
}

#[derive(Default)]
struct ReplicaState {
    events: Vec<Stored>,
    failing: bool,
    tampering: bool,
    delay: Option<Duration>,
    posts_received: usize,
}

impl ReplicaState {
    fn of_system<'a>(&'a self, system: &'a System) -> impl Iterator<Item = &'a Stored> + 'a {
        self.events.iter().filter(move |s| s.event.system == *system)
    }

    /// Keep one copy per (system, process, clock); later writes replace earlier ones.
    fn store(&mut self, stored: Stored) {
        let existing = self.events.iter().position(|s| {
            s.event.system == stored.event.system
                && s.event.process == stored.event.process
                && s.event.logical_clock == stored.event.logical_clock
        });
        match existing {
            Some(index) => self.events[index] = stored,
            None => self.events.push(stored),
        }
    }

    /// Highest-clock event per process, in first-seen process order.
    fn latest_per_process<'a>(&self, events: impl Iterator<Item = &'a Stored>) -> Vec<SignedEvent> {
        let mut latest: Vec<(&Process, &Stored)> = Vec::new();
        for stored in events {
            match latest.iter_mut().find(|(p, _)| **p == stored.event.process) {
                Some(slot) if slot.1.event.logical_clock < stored.event.logical_clock => slot.1 = stored,
                Some(_) => {}
                None => latest.push((&stored.event.process, stored)),
            }
        }
        latest.into_iter().map(|(_, s)| self.outgoing(&s.signed)).collect()
    }

    fn outgoing(&self, signed: &SignedEvent) -> SignedEvent {
        let mut signed = signed.clone();
        if self.tampering {
            if let Some(byte) = signed.signature.first_mut() {
                *byte ^= 0x01;
            }
        }
        signed
    }
}

/// In-memory replica servers.
///
/// Intended for tests and embedding. Each registered replica keeps its own
/// copy of the events posted to it and can be told to fail, stall, or flip a
/// signature bit on everything it serves.
pub struct InMemoryReplicas {
    replicas: RwLock<HashMap<Replica, ReplicaState>>,
    page_size: usize,
}

impl InMemoryReplicas {
    pub fn new() -> Self {
        Self {
            replicas: RwLock::new(HashMap::new()),
            page_size: 10,
        }
    }

    /// Items per reference-query page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn add_replica(&self, url: &str) -> Replica {
        let replica = Replica::new(url);
        self.replicas
            .write()
            .expect("lock poisoned")
            .entry(replica.clone())
            .or_default();
        replica
    }

    pub fn set_failing(&self, replica: &Replica, failing: bool) {
        self.with_state(replica, |state| state.failing = failing);
    }

    pub fn set_tampering(&self, replica: &Replica, tampering: bool) {
        self.with_state(replica, |state| state.tampering = tampering);
    }

    pub fn set_delay(&self, replica: &Replica, delay: Option<Duration>) {
        self.with_state(replica, |state| state.delay = delay);
    }

    /// Store an event directly, bypassing failure injection.
    ///
    /// Panics if `signed` does not decode; seeding is test setup.
    pub fn seed(&self, replica: &Replica, signed: SignedEvent) {
        let event = signed.decode_event().expect("seeded event must decode");
        self.with_state(replica, |state| state.store(Stored { event, signed }));
    }

    /// Every event a replica holds, in storage order.
    pub fn events_on(&self, replica: &Replica) -> Vec<SignedEvent> {
        let replicas = self.replicas.read().expect("lock poisoned");
        replicas
            .get(replica)
            .map(|state| state.events.iter().map(|s| s.signed.clone()).collect())
            .unwrap_or_default()
    }

    /// Successful `post_events` calls a replica has accepted.
    pub fn posts_received(&self, replica: &Replica) -> usize {
        let replicas = self.replicas.read().expect("lock poisoned");
        replicas.get(replica).map_or(0, |state| state.posts_received)
    }

    fn with_state<R>(&self, replica: &Replica, f: impl FnOnce(&mut ReplicaState) -> R) -> R {
        let mut replicas = self.replicas.write().expect("lock poisoned");
        f(replicas.entry(replica.clone()).or_default())
    }

    /// Apply failure and delay injection, then read the replica's state.
    async fn serve<R>(&self, replica: &Replica, f: impl FnOnce(&mut ReplicaState) -> SyncResult<R>) -> SyncResult<R> {
        let delay = {
            let replicas = self.replicas.read().expect("lock poisoned");
            let state = replicas
                .get(replica)
                .ok_or_else(|| SyncError::transport(replica, "unknown replica"))?;
            if state.failing {
                return Err(SyncError::transport(replica, "connection refused"));
            }
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut replicas = self.replicas.write().expect("lock poisoned");
        let state = replicas
            .get_mut(replica)
            .ok_or_else(|| SyncError::transport(replica, "unknown replica"))?;
        f(state)
    }
}

impl Default for InMemoryReplicas {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_cursor(cursor: Option<&[u8]>) -> usize {
    cursor
        .and_then(|c| <[u8; 8]>::try_from(c).ok())
        .map_or(0, |bytes| u64::from_be_bytes(bytes) as usize)
}

#[async_trait]
impl ReplicaGateway for InMemoryReplicas {
    async fn post_events(&self, replica: &Replica, events: &SignedEvents) -> SyncResult<()> {
        let decoded = events
            .events
            .iter()
            .map(|signed| {
                Ok(Stored {
                    event: signed.decode_event()?,
                    signed: signed.clone(),
                })
            })
            .collect::<SyncResult<Vec<_>>>()?;
        self.serve(replica, |state| {
            for stored in decoded {
                state.store(stored);
            }
            state.posts_received += 1;
            Ok(())
        })
        .await
    }

    async fn get_head(&self, replica: &Replica, system: &System) -> SyncResult<Vec<SignedEvent>> {
        self.serve(replica, |state| Ok(state.latest_per_process(state.of_system(system))))
            .await
    }

    async fn get_events(
        &self,
        replica: &Replica,
        system: &System,
        ranges: &RangesForSystem,
    ) -> SyncResult<Vec<SignedEvent>> {
        self.serve(replica, |state| {
            let mut out = Vec::new();
            for wanted in &ranges.ranges_for_processes {
                for range in &wanted.ranges {
                    out.extend(
                        state
                            .of_system(system)
                            .filter(|s| s.event.process == wanted.process)
                            .filter(|s| range.clocks().contains(&s.event.logical_clock))
                            .map(|s| state.outgoing(&s.signed)),
                    );
                }
            }
            Ok(out)
        })
        .await
    }

    async fn get_query_latest(
        &self,
        replica: &Replica,
        system: &System,
        content_types: &[u64],
    ) -> SyncResult<Vec<SignedEvent>> {
        self.serve(replica, |state| {
            let mut out = Vec::new();
            for content_type in content_types {
                let of_type = state
                    .of_system(system)
                    .filter(|s| s.event.content_type == *content_type);
                out.extend(state.latest_per_process(of_type));
            }
            Ok(out)
        })
        .await
    }

    async fn get_query_references(
        &self,
        replica: &Replica,
        reference: &Reference,
        cursor: Option<&[u8]>,
        content_type: u64,
    ) -> SyncResult<QueryReferencesResponse> {
        let page_size = self.page_size;
        self.serve(replica, |state| {
            let matching: Vec<&Stored> = state
                .events
                .iter()
                .filter(|s| s.event.content_type == content_type)
                .filter(|s| s.event.references.contains(reference))
                .collect();
            let start = decode_cursor(cursor).min(matching.len());
            let end = (start + page_size).min(matching.len());
            let items = matching[start..end]
                .iter()
                .map(|s| QueryReferencesItem {
                    event: Some(state.outgoing(&s.signed)),
                    counts: Vec::new(),
                })
                .collect();
            let cursor = (end < matching.len()).then(|| (end as u64).to_be_bytes().to_vec());
            Ok(QueryReferencesResponse {
                items,
                related_events: Vec::new(),
                cursor,
                counts: Vec::new(),
            })
        })
        .await
    }
}
