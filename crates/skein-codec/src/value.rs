/// A decoded (or to-be-encoded) field value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Uint(u64),
    Bytes(Vec<u8>),
    Struct(Message),
    Uints(Vec<u64>),
    Structs(Vec<Message>),
}

/// Positional field slots for one struct. Slot `i` holds field number `i + 1`;
/// `None` means the field is absent, which is distinct from zero or empty.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    fields: Vec<Option<Value>>,
}

impl Message {
    /// An all-absent message with `field_count` slots.
    pub fn new(field_count: usize) -> Self {
        Self {
            fields: vec![None; field_count],
        }
    }

    /// Builder-style setter. Field numbers are 1-based; out-of-range numbers grow the message.
    pub fn with(mut self, number: usize, value: impl Into<Option<Value>>) -> Self {
        self.set(number, value);
        self
    }

    pub fn set(&mut self, number: usize, value: impl Into<Option<Value>>) {
        assert!(number >= 1, "field numbers are 1-based");
        if self.fields.len() < number {
            self.fields.resize(number, None);
        }
        self.fields[number - 1] = value.into();
    }

    pub fn get(&self, number: usize) -> Option<&Value> {
        number
            .checked_sub(1)
            .and_then(|i| self.fields.get(i))
            .and_then(Option::as_ref)
    }

    /// Remove and return a field value, leaving the slot absent.
    pub fn take(&mut self, number: usize) -> Option<Value> {
        number
            .checked_sub(1)
            .and_then(|i| self.fields.get_mut(i))
            .and_then(Option::take)
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub(crate) fn slots(&self) -> &[Option<Value>] {
        &self.fields
    }

    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Option<Value> {
        &mut self.fields[index]
    }
}

impl Value {
    pub fn into_uint(self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_bytes(self) -> Option<Vec<u8>> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_struct(self) -> Option<Message> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_uints(self) -> Option<Vec<u64>> {
        match self {
            Value::Uints(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_structs(self) -> Option<Vec<Message>> {
        match self {
            Value::Structs(v) => Some(v),
            _ => None,
        }
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Message> for Value {
    fn from(v: Message) -> Self {
        Value::Struct(v)
    }
}

impl From<Vec<u64>> for Value {
    fn from(v: Vec<u64>) -> Self {
        Value::Uints(v)
    }
}

impl From<Vec<Message>> for Value {
    fn from(v: Vec<Message>) -> Self {
        Value::Structs(v)
    }
}
