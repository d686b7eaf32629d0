/// Wire type for a raw varint.
pub const WIRE_VARINT: u8 = 0;
/// Wire type for a length-delimited payload.
pub const WIRE_LEN: u8 = 2;

/// Shape of a message field.
///
/// Schemas are built once and shared; encode and decode dispatch on the
/// variant tag rather than inspecting values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Schema {
    /// Unsigned integer, varint-encoded.
    Scalar,
    /// Opaque byte string.
    Bytes,
    /// Nested message with positionally numbered fields.
    Struct(Vec<Field>),
    /// Packed run of varints inside one length-delimited region.
    RepeatedScalar,
    /// One length-delimited sub-message per element, same tag repeated.
    RepeatedStruct(Box<Schema>),
}

/// A named field slot. Field numbers are 1-based positions in declaration order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub schema: Schema,
}

impl Field {
    pub fn new(name: &'static str, schema: Schema) -> Self {
        Self { name, schema }
    }
}

impl Schema {
    /// Convenience constructor for a struct schema.
    pub fn message(fields: Vec<Field>) -> Self {
        Schema::Struct(fields)
    }

    /// Convenience constructor for a repeated-struct schema.
    pub fn repeated(element: Schema) -> Self {
        Schema::RepeatedStruct(Box::new(element))
    }

    /// The wire type this field is written with.
    pub fn wire_type(&self) -> u8 {
        match self {
            Schema::Scalar => WIRE_VARINT,
            Schema::Bytes
            | Schema::Struct(_)
            | Schema::RepeatedScalar
            | Schema::RepeatedStruct(_) => WIRE_LEN,
        }
    }

    /// Whether decoding accumulates into a list.
    pub fn is_repeated(&self) -> bool {
        matches!(self, Schema::RepeatedScalar | Schema::RepeatedStruct(_))
    }

    /// Fields of a struct schema, or an empty slice for any other shape.
    pub fn fields(&self) -> &[Field] {
        match self {
            Schema::Struct(fields) => fields,
            _ => &[],
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Schema::Scalar => "scalar",
            Schema::Bytes => "bytes",
            Schema::Struct(_) => "struct",
            Schema::RepeatedScalar => "repeated scalar",
            Schema::RepeatedStruct(_) => "repeated struct",
        }
    }
}

/// Wire tag for a 1-based field number.
pub fn tag(number: usize, wire_type: u8) -> u64 {
    (number as u64) * 8 + u64::from(wire_type)
}
