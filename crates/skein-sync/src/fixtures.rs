//! Shared builders for engine tests.

use std::sync::Arc;

use skein_crypto::{derive_public_key, generate_private_key, random_process_id, sign_event};
use skein_types::{
    ContentType, Event, Indices, LwwElement, PrivateKey, Process, Reference, SignedEvent, System,
    SystemProcesses, VectorClock, WireMessage,
};

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::gateway::{Replica, ReplicaSet};
use crate::memory::InMemoryReplicas;

pub struct Identity {
    pub private_key: PrivateKey,
    pub system: System,
}

impl Identity {
    pub fn new() -> Self {
        let private_key = generate_private_key();
        let system = derive_public_key(&private_key).unwrap();
        Self {
            private_key,
            system,
        }
    }

    pub fn event(&self, process: &Process, clock: u64, content_type: ContentType) -> Event {
        Event {
            system: self.system.clone(),
            process: process.clone(),
            logical_clock: clock,
            content_type: content_type.as_u64(),
            content: Vec::new(),
            vector_clock: VectorClock::default(),
            indices: Indices::default(),
            lww_element_set: None,
            lww_element: None,
            references: Vec::new(),
            unix_milliseconds: Some(1_000 + clock),
        }
    }

    pub fn sign(&self, event: &Event) -> SignedEvent {
        sign_event(&self.private_key, event).unwrap()
    }

    pub fn signed(&self, process: &Process, clock: u64, content_type: ContentType) -> SignedEvent {
        self.sign(&self.event(process, clock, content_type))
    }

    pub fn roster(&self, process: &Process, clock: u64, members: &[(Process, u64)]) -> SignedEvent {
        let mut event = self.event(process, clock, ContentType::SystemProcesses);
        event.content = SystemProcesses {
            processes: members.iter().map(|(p, _)| p.clone()).collect(),
        }
        .encode()
        .unwrap();
        event.vector_clock = VectorClock::new(members.iter().map(|(_, c)| *c).collect());
        self.sign(&event)
    }

    pub fn referencing(&self, process: &Process, clock: u64, reference: &Reference, at: u64) -> SignedEvent {
        let mut event = self.event(process, clock, ContentType::Post);
        event.references = vec![reference.clone()];
        event.unix_milliseconds = Some(at);
        self.sign(&event)
    }

    pub fn lww(&self, process: &Process, clock: u64, content_type: ContentType, value: Vec<u8>) -> SignedEvent {
        let mut event = self.event(process, clock, content_type);
        event.lww_element = Some(LwwElement {
            value,
            unix_milliseconds: 1_000 + clock,
        });
        self.sign(&event)
    }
}

pub fn process() -> Process {
    random_process_id()
}

pub struct Network {
    pub replicas: Arc<InMemoryReplicas>,
    pub urls: Vec<Replica>,
    pub engine: SyncEngine,
}

pub fn network(count: usize) -> Network {
    network_with(InMemoryReplicas::new(), count, SyncConfig::default())
}

pub fn network_with(replicas: InMemoryReplicas, count: usize, config: SyncConfig) -> Network {
    let replicas = Arc::new(replicas);
    let urls: Vec<Replica> = (0..count)
        .map(|i| replicas.add_replica(&format!("https://replica-{i}.test")))
        .collect();
    let engine = SyncEngine::new(replicas.clone(), ReplicaSet::new(urls.clone()), config);
    Network {
        replicas,
        urls,
        engine,
    }
}

impl Network {
    pub fn seed_all(&self, signed: &SignedEvent) {
        for url in &self.urls {
            self.replicas.seed(url, signed.clone());
        }
    }
}
