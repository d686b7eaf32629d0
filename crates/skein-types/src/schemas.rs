//! Static wire schemas. Field order is the wire numbering; never reorder.

use std::sync::LazyLock;

use skein_codec::{Field, Schema};

use skein_codec::Schema::{Bytes, RepeatedScalar, Scalar};

fn f(name: &'static str, schema: Schema) -> Field {
    Field::new(name, schema)
}

pub static KEY: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("key_type", Scalar), f("key", Bytes)]));

pub static PROCESS: LazyLock<Schema> = LazyLock::new(|| Schema::message(vec![f("process", Bytes)]));

pub static VECTOR_CLOCK: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("logical_clocks", RepeatedScalar)]));

pub static INDEX: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("index_type", Scalar), f("logical_clock", Scalar)])
});

pub static INDICES: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("indices", Schema::repeated(INDEX.clone()))]));

pub static LWW_ELEMENT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("value", Bytes), f("unix_milliseconds", Scalar)])
});

pub static LWW_ELEMENT_SET: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("operation", Scalar),
        f("value", Bytes),
        f("unix_milliseconds", Scalar),
    ])
});

pub static REFERENCE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("reference_type", Scalar), f("reference", Bytes)])
});

pub static RANGE: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("low", Scalar), f("high", Scalar)]));

pub static IMAGE_MANIFEST: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("mime", Bytes),
        f("width", Scalar),
        f("height", Scalar),
        f("byte_count", Scalar),
        f("process", PROCESS.clone()),
        f("sections", Schema::repeated(RANGE.clone())),
    ])
});

pub static IMAGE_BUNDLE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f(
        "image_manifests",
        Schema::repeated(IMAGE_MANIFEST.clone()),
    )])
});

pub static EVENT: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("system", KEY.clone()),
        f("process", PROCESS.clone()),
        f("logical_clock", Scalar),
        f("content_type", Scalar),
        f("content", Bytes),
        f("vector_clock", VECTOR_CLOCK.clone()),
        f("indices", INDICES.clone()),
        f("lww_element_set", LWW_ELEMENT_SET.clone()),
        f("lww_element", LWW_ELEMENT.clone()),
        f("references", Schema::repeated(REFERENCE.clone())),
        f("unix_milliseconds", Scalar),
    ])
});

pub static SIGNED_EVENT: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("signature", Bytes), f("event", Bytes)]));

pub static SIGNED_EVENTS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("events", Schema::repeated(SIGNED_EVENT.clone()))])
});

pub static POST: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("content", Bytes), f("image", IMAGE_MANIFEST.clone())])
});

pub static SYSTEM_PROCESSES: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("processes", Schema::repeated(PROCESS.clone()))])
});

pub static DIGEST: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("digest_type", Scalar), f("digest", Bytes)]));

pub static POINTER: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("system", KEY.clone()),
        f("process", PROCESS.clone()),
        f("logical_clock", Scalar),
        f("event_digest", DIGEST.clone()),
    ])
});

pub static RANGES_FOR_PROCESS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("process", PROCESS.clone()),
        f("ranges", Schema::repeated(RANGE.clone())),
    ])
});

pub static RANGES_FOR_SYSTEM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f(
        "ranges_for_processes",
        Schema::repeated(RANGES_FOR_PROCESS.clone()),
    )])
});

pub static NUMBERS: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("numbers", RepeatedScalar)]));

pub static COUNT_REFERENCES: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("from_type", Scalar)]));

pub static COUNT_LWW_ELEMENT_REFERENCES: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("value", Bytes), f("from_type", Scalar)]));

pub static QUERY_REFERENCES_EVENTS: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("from_type", Scalar),
        f(
            "count_lww_element_references",
            Schema::repeated(COUNT_LWW_ELEMENT_REFERENCES.clone()),
        ),
        f("count_references", Schema::repeated(COUNT_REFERENCES.clone())),
    ])
});

// Field 6 (extra byte references) is never sent by this client and is left
// out; the schema stays positionally aligned for fields 1-5.
pub static QUERY_REFERENCES_REQUEST: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("reference", REFERENCE.clone()),
        f("cursor", Bytes),
        f("request_events", QUERY_REFERENCES_EVENTS.clone()),
        f(
            "count_lww_element_references",
            Schema::repeated(COUNT_LWW_ELEMENT_REFERENCES.clone()),
        ),
        f("count_references", Schema::repeated(COUNT_REFERENCES.clone())),
    ])
});

pub static QUERY_REFERENCES_ITEM: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("event", SIGNED_EVENT.clone()), f("counts", RepeatedScalar)])
});

pub static QUERY_REFERENCES_RESPONSE: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![
        f("items", Schema::repeated(QUERY_REFERENCES_ITEM.clone())),
        f("related_events", Schema::repeated(SIGNED_EVENT.clone())),
        f("cursor", Bytes),
        f("counts", RepeatedScalar),
    ])
});

pub static DECODED_IMAGE: LazyLock<Schema> =
    LazyLock::new(|| Schema::message(vec![f("mime_type", Bytes), f("blob", Bytes)]));

pub static DECODED_IMAGES: LazyLock<Schema> = LazyLock::new(|| {
    Schema::message(vec![f("images", Schema::repeated(DECODED_IMAGE.clone()))])
});
