//! Content payloads and request bodies carried inside events or sent to replicas.

use skein_codec::{Message, Schema, Value};

use crate::error::TypeResult;
use crate::identity::Process;
use crate::schemas;
use crate::wire::{nested, structs, Fields, WireMessage};

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Content of a `Post` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Post {
    pub content: String,
    pub image: Option<ImageManifest>,
}

impl WireMessage for Post {
    fn schema() -> &'static Schema {
        &schemas::POST
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Bytes(self.content.as_bytes().to_vec()))
            .with(2, self.image.as_ref().map(nested))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Post");
        Ok(Self {
            content: text(fields.bytes(1)),
            image: fields.opt_message(2)?,
        })
    }
}

/// Roster content of a `SystemProcesses` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemProcesses {
    pub processes: Vec<Process>,
}

impl WireMessage for SystemProcesses {
    fn schema() -> &'static Schema {
        &schemas::SYSTEM_PROCESSES
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.processes))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "SystemProcesses");
        Ok(Self {
            processes: fields.messages(1)?,
        })
    }
}

/// Inclusive logical-clock range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub low: u64,
    pub high: u64,
}

impl Range {
    pub fn new(low: u64, high: u64) -> Self {
        Self { low, high }
    }

    pub fn single(clock: u64) -> Self {
        Self::new(clock, clock)
    }

    /// Clocks covered by this range, ascending. Empty when `low > high`.
    pub fn clocks(&self) -> std::ops::RangeInclusive<u64> {
        self.low..=self.high
    }
}

impl WireMessage for Range {
    fn schema() -> &'static Schema {
        &schemas::RANGE
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Uint(self.low))
            .with(2, Value::Uint(self.high))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Range");
        Ok(Self {
            low: fields.uint(1, "low")?,
            high: fields.uint(2, "high")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangesForProcess {
    pub process: Process,
    pub ranges: Vec<Range>,
}

impl WireMessage for RangesForProcess {
    fn schema() -> &'static Schema {
        &schemas::RANGES_FOR_PROCESS
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, nested(&self.process))
            .with(2, structs(&self.ranges))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "RangesForProcess");
        Ok(Self {
            process: fields.message(1, "process")?,
            ranges: fields.messages(2)?,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangesForSystem {
    pub ranges_for_processes: Vec<RangesForProcess>,
}

impl RangesForSystem {
    pub fn single(process: Process, ranges: Vec<Range>) -> Self {
        Self {
            ranges_for_processes: vec![RangesForProcess { process, ranges }],
        }
    }
}

impl WireMessage for RangesForSystem {
    fn schema() -> &'static Schema {
        &schemas::RANGES_FOR_SYSTEM
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.ranges_for_processes))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "RangesForSystem");
        Ok(Self {
            ranges_for_processes: fields.messages(1)?,
        })
    }
}

/// An image split into chunk events on `process`, listed by clock ranges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageManifest {
    pub mime: String,
    pub width: u64,
    pub height: u64,
    pub byte_count: u64,
    pub process: Process,
    pub sections: Vec<Range>,
}

impl WireMessage for ImageManifest {
    fn schema() -> &'static Schema {
        &schemas::IMAGE_MANIFEST
    }

    fn to_message(&self) -> Message {
        Message::new(6)
            .with(1, Value::Bytes(self.mime.as_bytes().to_vec()))
            .with(2, Value::Uint(self.width))
            .with(3, Value::Uint(self.height))
            .with(4, Value::Uint(self.byte_count))
            .with(5, nested(&self.process))
            .with(6, structs(&self.sections))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "ImageManifest");
        Ok(Self {
            mime: text(fields.bytes(1)),
            width: fields.opt_uint(2).unwrap_or_default(),
            height: fields.opt_uint(3).unwrap_or_default(),
            byte_count: fields.opt_uint(4).unwrap_or_default(),
            process: fields.message(5, "process")?,
            sections: fields.messages(6)?,
        })
    }
}

/// Several renditions of one image, e.g. avatar sizes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageBundle {
    pub image_manifests: Vec<ImageManifest>,
}

impl WireMessage for ImageBundle {
    fn schema() -> &'static Schema {
        &schemas::IMAGE_BUNDLE
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.image_manifests))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "ImageBundle");
        Ok(Self {
            image_manifests: fields.messages(1)?,
        })
    }
}

/// A packed list of numbers, used for content-type filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Numbers {
    pub numbers: Vec<u64>,
}

impl WireMessage for Numbers {
    fn schema() -> &'static Schema {
        &schemas::NUMBERS
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, Value::Uints(self.numbers.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "Numbers");
        Ok(Self {
            numbers: fields.uints(1),
        })
    }
}

/// A reassembled image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime_type: String,
    pub blob: Vec<u8>,
}

impl WireMessage for DecodedImage {
    fn schema() -> &'static Schema {
        &schemas::DECODED_IMAGE
    }

    fn to_message(&self) -> Message {
        Message::new(2)
            .with(1, Value::Bytes(self.mime_type.as_bytes().to_vec()))
            .with(2, Value::Bytes(self.blob.clone()))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "DecodedImage");
        Ok(Self {
            mime_type: text(fields.bytes(1)),
            blob: fields.bytes(2),
        })
    }
}

/// Cache representation of reassembled images.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedImages {
    pub images: Vec<DecodedImage>,
}

impl WireMessage for DecodedImages {
    fn schema() -> &'static Schema {
        &schemas::DECODED_IMAGES
    }

    fn to_message(&self) -> Message {
        Message::new(1).with(1, structs(&self.images))
    }

    fn from_message(message: Message) -> TypeResult<Self> {
        let mut fields = Fields::new(message, "DecodedImages");
        Ok(Self {
            images: fields.messages(1)?,
        })
    }
}
