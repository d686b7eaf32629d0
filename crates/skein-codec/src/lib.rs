//! Schema-driven binary codec for the skein wire format.
//!
//! Messages are described by a [`Schema`] tree built once and shared. Field
//! `i` (1-based, declaration order) is written with tag `i * 8 + wire_type`,
//! where the wire type is `0` for a varint and `2` for a length-delimited
//! payload. Integers are base-128 varints, least-significant group first.
//!
//! Decoding is deliberately strict: a field number beyond the schema's
//! declared length is an error rather than a skipped unknown field.

pub mod codec;
pub mod error;
pub mod schema;
pub mod value;
pub mod varint;

pub use codec::{decode, encode};
pub use error::{CodecError, CodecResult};
pub use schema::{Field, Schema, WIRE_LEN, WIRE_VARINT};
pub use value::{Message, Value};
pub use varint::{read_varint, varint_len, write_varint, MAX_VARINT_LEN};
