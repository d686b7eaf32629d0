use crate::error::{CodecError, CodecResult};
use crate::schema::{tag, Field, Schema, WIRE_LEN, WIRE_VARINT};
use crate::value::{Message, Value};
use crate::varint::{read_varint, write_varint};

/// Encode `message` according to a struct `schema`.
///
/// Absent fields emit nothing. Empty repeated fields also emit nothing, so
/// they decode back as empty lists.
pub fn encode(schema: &Schema, message: &Message) -> CodecResult<Vec<u8>> {
    let fields = root_fields(schema)?;
    let mut out = Vec::new();
    encode_struct(fields, message, &mut out)?;
    Ok(out)
}

/// Decode `buf` according to a struct `schema`.
///
/// Repeated fields always come back as (possibly empty) lists; every other
/// field not present on the wire stays absent.
pub fn decode(schema: &Schema, buf: &[u8]) -> CodecResult<Message> {
    let fields = root_fields(schema)?;
    decode_struct(fields, buf)
}

fn root_fields(schema: &Schema) -> CodecResult<&[Field]> {
    match schema {
        Schema::Struct(fields) => Ok(fields),
        other => Err(CodecError::SchemaMismatch {
            field: "<root>",
            expected: other.kind_name(),
        }),
    }
}

fn element_fields<'a>(field: &Field, element: &'a Schema) -> CodecResult<&'a [Field]> {
    match element {
        Schema::Struct(fields) => Ok(fields),
        _ => Err(CodecError::SchemaMismatch {
            field: field.name,
            expected: "struct element",
        }),
    }
}

fn write_delimited(number: usize, payload: &[u8], out: &mut Vec<u8>) {
    write_varint(tag(number, WIRE_LEN), out);
    write_varint(payload.len() as u64, out);
    out.extend_from_slice(payload);
}

fn encode_struct(fields: &[Field], message: &Message, out: &mut Vec<u8>) -> CodecResult<()> {
    let slots = message.slots();
    if slots.len() > fields.len() && slots[fields.len()..].iter().any(Option::is_some) {
        return Err(CodecError::ArityMismatch {
            declared: fields.len(),
            actual: slots.len(),
        });
    }

    for (index, field) in fields.iter().enumerate() {
        let Some(value) = slots.get(index).and_then(Option::as_ref) else {
            continue;
        };
        let number = index + 1;
        match (&field.schema, value) {
            (Schema::Scalar, Value::Uint(v)) => {
                write_varint(tag(number, WIRE_VARINT), out);
                write_varint(*v, out);
            }
            (Schema::Bytes, Value::Bytes(bytes)) => write_delimited(number, bytes, out),
            (Schema::Struct(children), Value::Struct(inner)) => {
                let mut payload = Vec::new();
                encode_struct(children, inner, &mut payload)?;
                write_delimited(number, &payload, out);
            }
            (Schema::RepeatedScalar, Value::Uints(values)) => {
                if values.is_empty() {
                    continue;
                }
                let mut payload = Vec::new();
                for v in values {
                    write_varint(*v, &mut payload);
                }
                write_delimited(number, &payload, out);
            }
            (Schema::RepeatedStruct(element), Value::Structs(items)) => {
                let children = element_fields(field, element)?;
                for item in items {
                    let mut payload = Vec::new();
                    encode_struct(children, item, &mut payload)?;
                    write_delimited(number, &payload, out);
                }
            }
            (schema, _) => {
                return Err(CodecError::SchemaMismatch {
                    field: field.name,
                    expected: schema.kind_name(),
                })
            }
        }
    }
    Ok(())
}

/// Read a length prefix at `offset` and return the payload bounds.
fn read_region(buf: &[u8], offset: usize) -> CodecResult<(usize, usize)> {
    let (length, start) = read_varint(buf, offset)?;
    let end = usize::try_from(length)
        .ok()
        .and_then(|len| start.checked_add(len))
        .filter(|end| *end <= buf.len())
        .ok_or(CodecError::LengthOverflow { offset, length })?;
    Ok((start, end))
}

fn decode_struct(fields: &[Field], buf: &[u8]) -> CodecResult<Message> {
    let mut message = Message::new(fields.len());
    for (index, field) in fields.iter().enumerate() {
        match field.schema {
            Schema::RepeatedScalar => message.set(index + 1, Value::Uints(Vec::new())),
            Schema::RepeatedStruct(_) => message.set(index + 1, Value::Structs(Vec::new())),
            _ => {}
        }
    }

    let mut pos = 0;
    while pos < buf.len() {
        let field_start = pos;
        let (key, next) = read_varint(buf, pos)?;
        pos = next;

        let number = key >> 3;
        let wire_type = (key & 0x7) as u8;
        if number == 0 {
            return Err(CodecError::FieldZero {
                offset: field_start,
            });
        }
        let field = usize::try_from(number)
            .ok()
            .and_then(|n| fields.get(n - 1))
            .ok_or(CodecError::UnknownField {
                number,
                declared: fields.len(),
            })?;
        if wire_type != WIRE_VARINT && wire_type != WIRE_LEN {
            return Err(CodecError::UnsupportedWireType { number, wire_type });
        }
        if wire_type != field.schema.wire_type() {
            return Err(CodecError::WireTypeMismatch {
                field: field.name,
                expected: field.schema.wire_type(),
                actual: wire_type,
            });
        }

        let slot = message.slot_mut(number as usize - 1);
        match &field.schema {
            Schema::Scalar => {
                let (value, next) = read_varint(buf, pos)?;
                *slot = Some(Value::Uint(value));
                pos = next;
            }
            Schema::Bytes => {
                let (start, end) = read_region(buf, pos)?;
                *slot = Some(Value::Bytes(buf[start..end].to_vec()));
                pos = end;
            }
            Schema::Struct(children) => {
                let (start, end) = read_region(buf, pos)?;
                *slot = Some(Value::Struct(decode_struct(children, &buf[start..end])?));
                pos = end;
            }
            Schema::RepeatedScalar => {
                let (start, end) = read_region(buf, pos)?;
                let region = &buf[start..end];
                let mut cursor = 0;
                let mut decoded = Vec::new();
                while cursor < region.len() {
                    let (value, next) = read_varint(region, cursor)?;
                    decoded.push(value);
                    cursor = next;
                }
                if let Some(Value::Uints(values)) = slot {
                    values.extend(decoded);
                }
                pos = end;
            }
            Schema::RepeatedStruct(element) => {
                let children = element_fields(field, element)?;
                let (start, end) = read_region(buf, pos)?;
                let item = decode_struct(children, &buf[start..end])?;
                if let Some(Value::Structs(items)) = slot {
                    items.push(item);
                }
                pos = end;
            }
        }
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Field;
    use proptest::prelude::*;

    fn point_schema() -> Schema {
        Schema::message(vec![
            Field::new("low", Schema::Scalar),
            Field::new("high", Schema::Scalar),
        ])
    }

    fn sample_schema() -> Schema {
        Schema::message(vec![
            Field::new("id", Schema::Scalar),
            Field::new("payload", Schema::Bytes),
            Field::new("inner", point_schema()),
            Field::new("clocks", Schema::RepeatedScalar),
            Field::new("ranges", Schema::repeated(point_schema())),
        ])
    }

    fn point(low: u64, high: u64) -> Message {
        Message::new(2).with(1, Value::Uint(low)).with(2, Value::Uint(high))
    }

    #[test]
    fn scalar_field_layout() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        let bytes = encode(&schema, &Message::new(1).with(1, Value::Uint(150))).unwrap();
        assert_eq!(bytes, vec![0x08, 0x96, 0x01]);
    }

    #[test]
    fn bytes_field_layout() {
        let schema = Schema::message(vec![
            Field::new("skip", Schema::Scalar),
            Field::new("b", Schema::Bytes),
        ]);
        let msg = Message::new(2).with(2, Value::Bytes(b"hi".to_vec()));
        assert_eq!(encode(&schema, &msg).unwrap(), vec![0x12, 0x02, b'h', b'i']);
    }

    #[test]
    fn absent_field_emits_no_tag() {
        let schema = sample_schema();
        let msg = Message::new(5).with(1, Value::Uint(3));
        let bytes = encode(&schema, &msg).unwrap();
        assert_eq!(bytes, vec![0x08, 0x03]);
        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(decoded.get(2), None);
        assert_eq!(decoded.get(3), None);
    }

    #[test]
    fn zero_scalar_is_present_not_absent() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        let bytes = encode(&schema, &Message::new(1).with(1, Value::Uint(0))).unwrap();
        assert_eq!(bytes, vec![0x08, 0x00]);
        assert_eq!(decode(&schema, &bytes).unwrap().get(1), Some(&Value::Uint(0)));
    }

    #[test]
    fn repeated_struct_repeats_tag_per_element() {
        let schema = Schema::message(vec![Field::new("ranges", Schema::repeated(point_schema()))]);
        let msg = Message::new(1).with(1, Value::Structs(vec![point(1, 2), point(3, 4)]));
        let bytes = encode(&schema, &msg).unwrap();
        assert_eq!(
            bytes,
            vec![0x0a, 0x04, 0x08, 0x01, 0x10, 0x02, 0x0a, 0x04, 0x08, 0x03, 0x10, 0x04]
        );
        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn repeated_scalar_is_packed() {
        let schema = Schema::message(vec![Field::new("clocks", Schema::RepeatedScalar)]);
        let msg = Message::new(1).with(1, Value::Uints(vec![1, 300]));
        let bytes = encode(&schema, &msg).unwrap();
        assert_eq!(bytes, vec![0x0a, 0x03, 0x01, 0xac, 0x02]);
    }

    #[test]
    fn repeated_scalar_regions_accumulate() {
        let schema = Schema::message(vec![Field::new("clocks", Schema::RepeatedScalar)]);
        let bytes = [0x0a, 0x01, 0x05, 0x0a, 0x01, 0x06];
        let decoded = decode(&schema, &bytes).unwrap();
        assert_eq!(decoded.get(1), Some(&Value::Uints(vec![5, 6])));
    }

    #[test]
    fn missing_repeated_decodes_empty() {
        let decoded = decode(&sample_schema(), &[]).unwrap();
        assert_eq!(decoded.get(4), Some(&Value::Uints(vec![])));
        assert_eq!(decoded.get(5), Some(&Value::Structs(vec![])));
        assert_eq!(decoded.get(1), None);
    }

    #[test]
    fn unknown_field_number_is_an_error() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        let err = decode(&schema, &[0x10, 0x01]).unwrap_err();
        assert_eq!(err, CodecError::UnknownField { number: 2, declared: 1 });
    }

    #[test]
    fn field_zero_is_an_error() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        assert!(matches!(decode(&schema, &[0x00, 0x01]), Err(CodecError::FieldZero { .. })));
    }

    #[test]
    fn wire_type_mismatch_is_an_error() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        assert!(matches!(
            decode(&schema, &[0x0a, 0x00]),
            Err(CodecError::WireTypeMismatch { field: "n", .. })
        ));
        assert!(matches!(
            decode(&schema, &[0x0d, 0x00]),
            Err(CodecError::UnsupportedWireType { number: 1, wire_type: 5 })
        ));
    }

    #[test]
    fn truncated_payload_is_an_error() {
        let schema = Schema::message(vec![Field::new("b", Schema::Bytes)]);
        assert!(matches!(
            decode(&schema, &[0x0a, 0x05, 0x01]),
            Err(CodecError::LengthOverflow { length: 5, .. })
        ));
        assert!(matches!(decode(&schema, &[0x0a]), Err(CodecError::Truncated { .. })));
    }

    #[test]
    fn nested_length_cannot_escape_parent() {
        // Outer struct claims 2 bytes; the inner bytes field claims 4.
        let schema = Schema::message(vec![Field::new(
            "inner",
            Schema::message(vec![Field::new("b", Schema::Bytes)]),
        )]);
        let bytes = [0x0a, 0x02, 0x0a, 0x04, 0x01, 0x02, 0x03, 0x04];
        assert!(decode(&schema, &bytes).is_err());
    }

    #[test]
    fn value_schema_mismatch_on_encode() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        let msg = Message::new(1).with(1, Value::Bytes(vec![1]));
        assert!(matches!(
            encode(&schema, &msg),
            Err(CodecError::SchemaMismatch { field: "n", .. })
        ));
    }

    #[test]
    fn extra_populated_slot_on_encode() {
        let schema = Schema::message(vec![Field::new("n", Schema::Scalar)]);
        let msg = Message::new(1).with(2, Value::Uint(1));
        assert!(matches!(encode(&schema, &msg), Err(CodecError::ArityMismatch { .. })));
    }

    #[test]
    fn non_struct_root_rejected() {
        assert!(decode(&Schema::Bytes, &[]).is_err());
        assert!(encode(&Schema::Scalar, &Message::new(0)).is_err());
    }

    fn arb_point() -> impl Strategy<Value = Message> {
        (any::<u64>(), any::<u64>()).prop_map(|(l, h)| point(l, h))
    }

    fn arb_sample() -> impl Strategy<Value = Message> {
        (
            proptest::option::of(any::<u64>()),
            proptest::option::of(proptest::collection::vec(any::<u8>(), 0..64)),
            proptest::option::of(arb_point()),
            proptest::collection::vec(any::<u64>(), 0..16),
            proptest::collection::vec(arb_point(), 0..8),
        )
            .prop_map(|(id, payload, inner, clocks, ranges)| {
                Message::new(5)
                    .with(1, id.map(Value::Uint))
                    .with(2, payload.map(Value::Bytes))
                    .with(3, inner.map(Value::Struct))
                    .with(4, Value::Uints(clocks))
                    .with(5, Value::Structs(ranges))
            })
    }

    proptest! {
        #[test]
        fn roundtrip(msg in arb_sample()) {
            let schema = sample_schema();
            let bytes = encode(&schema, &msg).unwrap();
            prop_assert_eq!(decode(&schema, &bytes).unwrap(), msg);
        }

        #[test]
        fn decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..128)) {
            let _ = decode(&sample_schema(), &bytes);
        }
    }
}
