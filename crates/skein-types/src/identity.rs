use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use skein_codec::{Message, Schema, Value};

use crate::error::{TypeError, TypeResult};
use crate::schemas;
use crate::wire::{Fields, WireMessage};

/// Key type tag for Ed25519 keys.
pub const KEY_TYPE_ED25519: u64 = 1;

/// Length of a freshly generated process identifier.
pub const PROCESS_ID_LEN: usize = 16;

/// A public-key identity.
///
/// Two systems are equal when their key bytes are equal; the key type tag
/// does not participate in equality or hashing.
#[derive(Clone, Serialize, Deserialize)]
pub struct System {
    pub key_type: u64,
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
}

impl System {
    pub fn new(key_type: u64, key: Vec<u8>) -> Self {
        Self { key_type, key }
    }

    /// Full hex-encoded key.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.key)
    }

    /// Short identifier (first 8 hex characters).
    pub fn short_id(&self) -> String {
        hex::encode(&self.key[..self.key.len().min(4)])
    }

    /// Parse an Ed25519 system from a hex-encoded key.
    pub fn from_hex(s: &str) -> TypeResult<Self> {
        let key = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self::new(KEY_TYPE_ED25519, key))
    }
}

impl PartialEq for System {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for System {}

impl Hash for System {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "System({})", self.short_id())
    }
}

impl fmt::Display for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl WireMessage for System {
    fn schema() -> &'static Schema {
        &schemas::KEY
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.key_type))
            .with(2, Value::Bytes(self.key.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "System");
        Ok(Self {
            key_type: fields.uint(1, "key_type")?,
            key: fields.required_bytes(2, "key")?,
        })
    }
}

/// The secret half of a system's key pair. Shares the wire shape of [`System`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateKey {
    pub key_type: u64,
    #[serde(with = "hex::serde")]
    pub key: Vec<u8>,
}

impl PrivateKey {
    pub fn new(key_type: u64, key: Vec<u8>) -> Self {
        Self { key_type, key }
    }

    /// Parse an Ed25519 private key from hex.
    pub fn from_hex(s: &str) -> TypeResult<Self> {
        let key = hex::decode(s.trim()).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self::new(KEY_TYPE_ED25519, key))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKey(<redacted>)")
    }
}

impl WireMessage for PrivateKey {
    fn schema() -> &'static Schema {
        &schemas::KEY
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.key_type))
            .with(2, Value::Bytes(self.key.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "PrivateKey");
        Ok(Self {
            key_type: fields.uint(1, "key_type")?,
            key: fields.required_bytes(2, "key")?,
        })
    }
}

/// A writer identifier scoped to one system.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Process(#[serde(with = "hex::serde")] pub Vec<u8>);

impl Process {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> TypeResult<Self> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Debug for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Process({})", self.to_hex())
    }
}

impl fmt::Display for Process {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl WireMessage for Process {
    fn schema() -> &'static Schema {
        &schemas::PROCESS
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, Value::Bytes(self.0.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Process");
        Ok(Self(fields.required_bytes(1, "process")?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn system_equality_ignores_key_type() {
        let a = System::new(1, vec![1, 2, 3]);
        let b = System::new(7, vec![1, 2, 3]);
        assert_eq!(a, b);
        let set: HashSet<_> = [a, b].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn system_wire_roundtrip() {
        let system = System::new(KEY_TYPE_ED25519, vec![9; 32]);
        let bytes = system.encode().unwrap();
        let decoded = System::decode(&bytes).unwrap();
        assert_eq!(decoded, system);
        assert_eq!(decoded.key_type, KEY_TYPE_ED25519);
    }

    #[test]
    fn system_missing_key_is_error() {
        let bytes = skein_codec::encode(&schemas::KEY, &Message::new(2).with(1, Value::Uint(1))).unwrap();
        let err = System::decode(&bytes).unwrap_err();
        assert_eq!(
            err,
            TypeError::MissingField {
                message: "System",
                field: "key"
            }
        );
    }

    #[test]
    fn system_hex_roundtrip() {
        let system = System::new(KEY_TYPE_ED25519, vec![0xab, 0xcd]);
        assert_eq!(system.to_hex(), "abcd");
        assert_eq!(System::from_hex("abcd").unwrap(), system);
        assert!(System::from_hex("zz").is_err());
    }

    #[test]
    fn private_key_debug_redacts() {
        let key = PrivateKey::new(KEY_TYPE_ED25519, vec![1; 32]);
        assert!(format!("{key:?}").contains("redacted"));
    }

    #[test]
    fn process_serde_is_hex() {
        let process = Process::new(vec![0x01, 0xff]);
        let json = serde_json::to_string(&process).unwrap();
        assert_eq!(json, "\"01ff\"");
        let parsed: Process = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, process);
    }
}
