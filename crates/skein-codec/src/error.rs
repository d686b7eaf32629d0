use thiserror::Error;

/// Errors produced while encoding or decoding wire messages.
///
/// Decode errors are always fatal to the single call that produced them;
/// the decoder never returns a partially populated message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer truncated at offset {offset}: needed {needed} more byte(s)")]
    Truncated { offset: usize, needed: usize },

    #[error("malformed varint at offset {offset}")]
    MalformedVarint { offset: usize },

    #[error("unknown field number {number} (schema declares {declared} field(s))")]
    UnknownField { number: u64, declared: usize },

    #[error("field number zero at offset {offset}")]
    FieldZero { offset: usize },

    #[error("unsupported wire type {wire_type} for field {number}")]
    UnsupportedWireType { number: u64, wire_type: u8 },

    #[error("field {field}: expected wire type {expected}, got {actual}")]
    WireTypeMismatch {
        field: &'static str,
        expected: u8,
        actual: u8,
    },

    #[error("length {length} at offset {offset} exceeds the enclosing message")]
    LengthOverflow { offset: usize, length: u64 },

    #[error("field {field}: value does not match schema ({expected} expected)")]
    SchemaMismatch {
        field: &'static str,
        expected: &'static str,
    },

    #[error("message has {actual} field slot(s) but schema declares {declared}")]
    ArityMismatch { declared: usize, actual: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;
