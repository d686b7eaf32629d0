//! Reference-query request and response bodies.

use skein_codec::{Message, Schema, Value};

use crate::error::TypeResult;
use crate::event::{Reference, SignedEvent};
use crate::schemas;
use crate::wire::{nested, structs, Fields, WireMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountReferences {
    pub from_type: u64,
}

impl WireMessage for CountReferences {
    fn schema() -> &'static Schema {
        &schemas::COUNT_REFERENCES
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, Value::Uint(self.from_type))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "CountReferences");
        Ok(Self {
            from_type: fields.opt_uint(1).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountLwwElementReferences {
    pub value: Vec<u8>,
    pub from_type: u64,
}

impl WireMessage for CountLwwElementReferences {
    fn schema() -> &'static Schema {
        &schemas::COUNT_LWW_ELEMENT_REFERENCES
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Bytes(self.value.clone()))
            .with(2, Value::Uint(self.from_type))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "CountLwwElementReferences");
        Ok(Self {
            value: fields.bytes(1),
            from_type: fields.opt_uint(2).unwrap_or_default(),
        })
    }
}

/// Which referencing events to return, by content type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReferencesEvents {
    pub from_type: Option<u64>,
    pub count_lww_element_references: Vec<CountLwwElementReferences>,
    pub count_references: Vec<CountReferences>,
}

impl QueryReferencesEvents {
    pub fn of_type(content_type: u64) -> Self {
        Self {
            from_type: Some(content_type),
            ..Self::default()
        }
    }
}

impl WireMessage for QueryReferencesEvents {
    fn schema() -> &'static Schema {
        &schemas::QUERY_REFERENCES_EVENTS
    }

    fn to_message(&self) -> Message {
        Message::new(3)
            .with(1, self.from_type.map(Value::Uint))
            .with(2, structs(&self.count_lww_element_references))
            .with(3, structs(&self.count_references))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "QueryReferencesEvents");
        Ok(Self {
            from_type: fields.opt_uint(1),
            count_lww_element_references: fields.messages(2)?,
            count_references: fields.messages(3)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReferencesRequest {
    pub reference: Reference,
    pub cursor: Option<Vec<u8>>,
    pub request_events: Option<QueryReferencesEvents>,
    pub count_lww_element_references: Vec<CountLwwElementReferences>,
    pub count_references: Vec<CountReferences>,
}

impl QueryReferencesRequest {
    /// A page request for events of `content_type` referencing `reference`.
    pub fn events_of_type(reference: Reference, content_type: u64, cursor: Option<Vec<u8>>) -> Self {
        Self {
            reference,
            cursor,
            request_events: Some(QueryReferencesEvents::of_type(content_type)),
            count_lww_element_references: Vec::new(),
            count_references: Vec::new(),
        }
    }
}

impl WireMessage for QueryReferencesRequest {
    fn schema() -> &'static Schema {
        &schemas::QUERY_REFERENCES_REQUEST
    }

    fn to_message(&self) -> Message {
        Message::new(5)
            .with(1, nested(&self.reference))
            .with(2, self.cursor.clone().map(Value::Bytes))
            .with(3, self.request_events.as_ref().map(nested))
            .with(4, structs(&self.count_lww_element_references))
            .with(5, structs(&self.count_references))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "QueryReferencesRequest");
        Ok(Self {
            reference: fields.message(1, "reference")?,
            cursor: fields.opt_bytes(2),
            request_events: fields.opt_message(3)?,
            count_lww_element_references: fields.messages(4)?,
            count_references: fields.messages(5)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryReferencesItem {
    pub event: Option<SignedEvent>,
    pub counts: Vec<u64>,
}

impl WireMessage for QueryReferencesItem {
    fn schema() -> &'static Schema {
        &schemas::QUERY_REFERENCES_ITEM
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, self.event.as_ref().map(nested))
            .with(2, Value::Uints(self.counts.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "QueryReferencesItem");
        Ok(Self {
            event: fields.opt_message(1)?,
            counts: fields.uints(2),
        })
    }
}

/// One page of a reference query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryReferencesResponse {
    pub items: Vec<QueryReferencesItem>,
    pub related_events: Vec<SignedEvent>,
    /// Opaque continuation token; `None` (or empty) means no further pages.
    pub cursor: Option<Vec<u8>>,
    pub counts: Vec<u64>,
}

impl QueryReferencesResponse {
    pub fn next_cursor(&self) -> Option<&[u8]> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }

    /// Append a later page, taking its cursor.
    pub fn extend(&mut self, page: QueryReferencesResponse) {
        self.items.extend(page.items);
        self.related_events.extend(page.related_events);
        self.counts.extend(page.counts);
        self.cursor = page.cursor;
    }
}

impl WireMessage for QueryReferencesResponse {
    fn schema() -> &'static Schema {
        &schemas::QUERY_REFERENCES_RESPONSE
    }

    fn to_message(&self) -> Message {
        Message::new(4)
            .with(1, structs(&self.items))
            .with(2, structs(&self.related_events))
            .with(3, self.cursor.clone().map(Value::Bytes))
            .with(4, Value::Uints(self.counts.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "QueryReferencesResponse");
        Ok(Self {
            items: fields.messages(1)?,
            related_events: fields.messages(2)?,
            cursor: fields.opt_bytes(3),
            counts: fields.uints(4),
        })
    }
}
