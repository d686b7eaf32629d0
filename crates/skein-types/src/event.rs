use std::fmt;

use serde::{Deserialize, Serialize};
use skein_codec::{Message, Schema, Value};

use crate::clock::{Indices, VectorClock};
use crate::content::{ContentType, DIGEST_TYPE_SHA256, REFERENCE_TYPE_BLOB, REFERENCE_TYPE_POINTER};
use crate::error::TypeResult;
use crate::identity::{Process, System};
use crate::schemas;
use crate::wire::{nested, structs, Fields, WireMessage};

/// One immutable record authored by a (system, process).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub system: System,
    pub process: Process,
    pub logical_clock: u64,
    /// Raw content type number; see [`Event::kind`] for the typed view.
    pub content_type: u64,
    pub content: Vec<u8>,
    pub vector_clock: VectorClock,
    pub indices: Indices,
    pub lww_element_set: Option<LwwElementSet>,
    pub lww_element: Option<LwwElement>,
    pub references: Vec<Reference>,
    pub unix_milliseconds: Option<u64>,
}

impl Event {
    pub fn kind(&self) -> Option<ContentType> {
        ContentType::from_u64(self.content_type)
    }

    pub fn is(&self, content_type: ContentType) -> bool {
        self.content_type == content_type.as_u64()
    }

    /// Deduplication key `hex(system):clock`.
    pub fn key(&self) -> EventKey {
        EventKey::new(&self.system, self.logical_clock)
    }
}

impl WireMessage for Event {
    fn schema() -> &'static Schema {
        &schemas::EVENT
    }

    fn to_message(&self) -> Message {
        Message::new(11)
            .with(1, nested(&self.system))
            .with(2, nested(&self.process))
            .with(3, Value::Uint(self.logical_clock))
            .with(4, Value::Uint(self.content_type))
            .with(5, Value::Bytes(self.content.clone()))
            .with(6, nested(&self.vector_clock))
            .with(7, nested(&self.indices))
            .with(8, self.lww_element_set.as_ref().map(nested))
            .with(9, self.lww_element.as_ref().map(nested))
            .with(10, structs(&self.references))
            .with(11, self.unix_milliseconds.map(Value::Uint))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Event");
        Ok(Self {
            system: fields.message(1, "system")?,
            process: fields.message(2, "process")?,
            logical_clock: fields.uint(3, "logical_clock")?,
            content_type: fields.uint(4, "content_type")?,
            content: fields.bytes(5),
            vector_clock: fields.opt_message(6)?.unwrap_or_default(),
            indices: fields.opt_message(7)?.unwrap_or_default(),
            lww_element_set: fields.opt_message(8)?,
            lww_element: fields.opt_message(9)?,
            references: fields.messages(10)?,
            unix_milliseconds: fields.opt_uint(11),
        })
    }
}

/// Encoded event bytes plus a signature over exactly those bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedEvent {
    pub signature: Vec<u8>,
    pub event: Vec<u8>,
}

impl SignedEvent {
    pub fn new(signature: Vec<u8>, event: Vec<u8>) -> Self {
        Self { signature, event }
    }

    /// Decode the embedded event. Its fields are untrusted until the
    /// signature has been verified.
    pub fn decode_event(&self) -> TypeResult<Event> {
        Event::decode(&self.event)
    }
}

impl fmt::Debug for SignedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignedEvent")
            .field("signature_len", &self.signature.len())
            .field("event_len", &self.event.len())
            .finish()
    }
}

impl WireMessage for SignedEvent {
    fn schema() -> &'static Schema {
        &schemas::SIGNED_EVENT
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Bytes(self.signature.clone()))
            .with(2, Value::Bytes(self.event.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "SignedEvent");
        Ok(Self {
            signature: fields.bytes(1),
            event: fields.bytes(2),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignedEvents {
    pub events: Vec<SignedEvent>,
}

impl SignedEvents {
    pub fn new(events: Vec<SignedEvent>) -> Self {
        Self { events }
    }
}

impl WireMessage for SignedEvents {
    fn schema() -> &'static Schema {
        &schemas::SIGNED_EVENTS
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.events))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "SignedEvents");
        Ok(Self {
            events: fields.messages(1)?,
        })
    }
}

/// Last-write-wins register value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LwwElement {
    pub value: Vec<u8>,
    pub unix_milliseconds: u64,
}

impl WireMessage for LwwElement {
    fn schema() -> &'static Schema {
        &schemas::LWW_ELEMENT
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Bytes(self.value.clone()))
            .with(2, Value::Uint(self.unix_milliseconds))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "LwwElement");
        Ok(Self {
            value: fields.bytes(1),
            unix_milliseconds: fields.uint(2, "unix_milliseconds")?,
        })
    }
}

/// Last-write-wins set membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LwwElementSet {
    pub operation: u64,
    pub value: Vec<u8>,
    pub unix_milliseconds: u64,
}

impl LwwElementSet {
    pub const ADD: u64 = 0;
    pub const REMOVE: u64 = 1;
}

impl WireMessage for LwwElementSet {
    fn schema() -> &'static Schema {
        &schemas::LWW_ELEMENT_SET
    }

    fn to_message(&self) -> Message {
        Message::new(3)
            .with(1, Value::Uint(self.operation))
            .with(2, Value::Bytes(self.value.clone()))
            .with(3, Value::Uint(self.unix_milliseconds))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "LwwElementSet");
        Ok(Self {
            operation: fields.opt_uint(1).unwrap_or(Self::ADD),
            value: fields.bytes(2),
            unix_milliseconds: fields.uint(3, "unix_milliseconds")?,
        })
    }
}

/// A typed link from an event to some other object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub reference_type: u64,
    pub reference: Vec<u8>,
}

impl Reference {
    pub fn from_pointer(pointer: &Pointer) -> TypeResult<Self> {
        Ok(Self {
            reference_type: REFERENCE_TYPE_POINTER,
            reference: pointer.encode()?,
        })
    }

    /// An opaque content key, e.g. a normalized URL.
    pub fn from_blob(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            reference_type: REFERENCE_TYPE_BLOB,
            reference: bytes.into(),
        }
    }

    /// The referenced pointer, if this is a pointer reference.
    pub fn pointer(&self) -> Option<TypeResult<Pointer>> {
        (self.reference_type == REFERENCE_TYPE_POINTER).then(|| Pointer::decode(&self.reference))
    }
}

impl WireMessage for Reference {
    fn schema() -> &'static Schema {
        &schemas::REFERENCE
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.reference_type))
            .with(2, Value::Bytes(self.reference.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Reference");
        Ok(Self {
            reference_type: fields.uint(1, "reference_type")?,
            reference: fields.bytes(2),
        })
    }
}

/// A typed content hash. Equal only when both type and bytes match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Digest {
    pub digest_type: u64,
    #[serde(with = "hex::serde")]
    pub digest: Vec<u8>,
}

impl Digest {
    pub fn sha256(digest: Vec<u8>) -> Self {
        Self {
            digest_type: DIGEST_TYPE_SHA256,
            digest,
        }
    }
}

impl WireMessage for Digest {
    fn schema() -> &'static Schema {
        &schemas::DIGEST
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.digest_type))
            .with(2, Value::Bytes(self.digest.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Digest");
        Ok(Self {
            digest_type: fields.uint(1, "digest_type")?,
            digest: fields.required_bytes(2, "digest")?,
        })
    }
}

/// Content-addressed reference to one specific event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pointer {
    pub system: System,
    pub process: Process,
    pub logical_clock: u64,
    pub event_digest: Digest,
}

impl WireMessage for Pointer {
    fn schema() -> &'static Schema {
        &schemas::POINTER
    }

    fn to_message(&self) -> Message {
        Message::new(4)
            .with(1, nested(&self.system))
            .with(2, nested(&self.process))
            .with(3, Value::Uint(self.logical_clock))
            .with(4, nested(&self.event_digest))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Pointer");
        Ok(Self {
            system: fields.message(1, "system")?,
            process: fields.message(2, "process")?,
            logical_clock: fields.uint(3, "logical_clock")?,
            event_digest: fields.message(4, "event_digest")?,
        })
    }
}

/// Cross-replica deduplication key: `hex(system.key):logical_clock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(system: &System, logical_clock: u64) -> Self {
        Self(format!("{}:{}", system.to_hex(), logical_clock))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blob chunk key: `hex(process)#logical_clock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkKey(String);

impl ChunkKey {
    pub fn new(process: &Process, logical_clock: u64) -> Self {
        Self(format!("{}#{}", process.to_hex(), logical_clock))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
