use skein_codec::{Message, Schema, Value};

use crate::error::{TypeError, TypeResult};

/// A typed entity with a fixed wire schema.
pub trait WireMessage: Sized {
    /// The schema this type is encoded with.
    fn schema() -> &'static Schema;

    /// Lower into positional field slots.
    fn to_message(&self) -> Message;

    /// Lift from decoded field slots.
    fn from_message(message: Message) -> TypeResult<Self>;

    fn encode(&self) -> TypeResult<Vec<u8>> {
        Ok(skein_codec::encode(Self::schema(), &self.to_message())?)
    }

    fn decode(bytes: &[u8]) -> TypeResult<Self> {
        Self::from_message(skein_codec::decode(Self::schema(), bytes)?)
    }
}

/// Consuming field reader used by `from_message` impls.
pub(crate) struct Fields {
    message: Message,
    name: &'static str,
}

impl Fields {
    pub(crate) fn new(message: Message, name: &'static str) -> Self {
        Self { message, name }
    }

    fn missing(&self, field: &'static str) -> TypeError {
        TypeError::MissingField {
            message: self.name,
            field,
        }
    }

    pub(crate) fn opt_uint(&mut self, number: usize) -> Option<u64> {
        self.message.take(number).and_then(Value::into_uint)
    }

    pub(crate) fn uint(&mut self, number: usize, field: &'static str) -> TypeResult<u64> {
        self.opt_uint(number).ok_or_else(|| self.missing(field))
    }

    pub(crate) fn opt_bytes(&mut self, number: usize) -> Option<Vec<u8>> {
        self.message.take(number).and_then(Value::into_bytes)
    }

    /// Byte fields default to empty: encoders commonly omit empty payloads.
    pub(crate) fn bytes(&mut self, number: usize) -> Vec<u8> {
        self.opt_bytes(number).unwrap_or_default()
    }

    pub(crate) fn required_bytes(&mut self, number: usize, field: &'static str) -> TypeResult<Vec<u8>> {
        self.opt_bytes(number).ok_or_else(|| self.missing(field))
    }

    pub(crate) fn opt_message<T: WireMessage>(&mut self, number: usize) -> TypeResult<Option<T>> {
        self.message
            .take(number)
            .and_then(Value::into_struct)
            .map(T::from_message)
            .transpose()
    }

    pub(crate) fn message<T: WireMessage>(&mut self, number: usize, field: &'static str) -> TypeResult<T> {
        self.opt_message(number)?.ok_or_else(|| self.missing(field))
    }

    pub(crate) fn uints(&mut self, number: usize) -> Vec<u64> {
        self.message
            .take(number)
            .and_then(Value::into_uints)
            .unwrap_or_default()
    }

    pub(crate) fn messages<T: WireMessage>(&mut self, number: usize) -> TypeResult<Vec<T>> {
        self.message
            .take(number)
            .and_then(Value::into_structs)
            .unwrap_or_default()
            .into_iter()
            .map(T::from_message)
            .collect()
    }
}

pub(crate) fn structs<T: WireMessage>(items: &[T]) -> Value {
    Value::Structs(items.iter().map(WireMessage::to_message).collect())
}

pub(crate) fn nested<T: WireMessage>(item: &T) -> Value {
    Value::Struct(item.to_message())
}
