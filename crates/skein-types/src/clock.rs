use serde::{Deserialize, Serialize};
use skein_codec::{Message, Schema, Value};

use crate::content::ContentType;
use crate::error::{TypeError, TypeResult};
use crate::schemas;
use crate::wire::{structs, Fields, WireMessage};

/// The clock that follows `clock`.
pub fn clock_after(clock: u64) -> TypeResult<u64> {
    clock.checked_add(1).ok_or(TypeError::ClockExhausted(clock))
}

/// Per-process clocks, positionally aligned with a system's process roster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorClock {
    pub logical_clocks: Vec<u64>,
}

impl VectorClock {
    pub fn new(logical_clocks: Vec<u64>) -> Self {
        Self { logical_clocks }
    }
}

impl WireMessage for VectorClock {
    fn schema() -> &'static Schema {
        &schemas::VECTOR_CLOCK
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, Value::Uints(self.logical_clocks.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "VectorClock");
        Ok(Self {
            logical_clocks: fields.uints(1),
        })
    }
}

/// The latest logical clock a process has written for one content type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub index_type: u64,
    pub logical_clock: u64,
}

impl Index {
    pub fn new(index_type: u64, logical_clock: u64) -> Self {
        Self {
            index_type,
            logical_clock,
        }
    }
}

impl WireMessage for Index {
    fn schema() -> &'static Schema {
        &schemas::INDEX
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.index_type))
            .with(2, Value::Uint(self.logical_clock))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Index");
        Ok(Self {
            index_type: fields.uint(1, "index_type")?,
            logical_clock: fields.uint(2, "logical_clock")?,
        })
    }
}

/// Per-content-type latest clocks carried by every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Indices {
    pub indices: Vec<Index>,
}

impl Indices {
    pub fn new(indices: Vec<Index>) -> Self {
        Self { indices }
    }

    pub fn get(&self, content_type: ContentType) -> Option<u64> {
        let wanted = content_type.as_u64();
        self.indices
            .iter()
            .find(|index| index.index_type == wanted)
            .map(|index| index.logical_clock)
    }

    /// Set the clock for `content_type`, appending an entry if none exists.
    pub fn upsert(&mut self, content_type: ContentType, logical_clock: u64) {
        let wanted = content_type.as_u64();
        match self.indices.iter_mut().find(|index| index.index_type == wanted) {
            Some(index) => index.logical_clock = logical_clock,
            None => self.indices.push(Index::new(wanted, logical_clock)),
        }
    }
}

impl WireMessage for Indices {
    fn schema() -> &'static Schema {
        &schemas::INDICES
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.indices))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Indices");
        Ok(Self {
            indices: fields.messages(1)?,
        })
    }
}
