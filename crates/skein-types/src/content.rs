use std::fmt;

use serde::{Deserialize, Serialize};

/// Known event content types and their wire numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Delete,
    SystemProcesses,
    Post,
    Follow,
    Username,
    Description,
    BlobMeta,
    BlobSection,
    Avatar,
    Server,
    Vouch,
    Claim,
    Banner,
    Opinion,
    Store,
    Authority,
    JoinTopic,
    Block,
}

impl ContentType {
    pub const ALL: [ContentType; 18] = [
        ContentType::Delete,
        ContentType::SystemProcesses,
        ContentType::Post,
        ContentType::Follow,
        ContentType::Username,
        ContentType::Description,
        ContentType::BlobMeta,
        ContentType::BlobSection,
        ContentType::Avatar,
        ContentType::Server,
        ContentType::Vouch,
        ContentType::Claim,
        ContentType::Banner,
        ContentType::Opinion,
        ContentType::Store,
        ContentType::Authority,
        ContentType::JoinTopic,
        ContentType::Block,
    ];

    pub fn as_u64(self) -> u64 {
        match self {
            ContentType::Delete => 1,
            ContentType::SystemProcesses => 2,
            ContentType::Post => 3,
            ContentType::Follow => 4,
            ContentType::Username => 5,
            ContentType::Description => 6,
            ContentType::BlobMeta => 7,
            ContentType::BlobSection => 8,
            ContentType::Avatar => 9,
            ContentType::Server => 10,
            ContentType::Vouch => 11,
            ContentType::Claim => 12,
            ContentType::Banner => 13,
            ContentType::Opinion => 14,
            ContentType::Store => 15,
            ContentType::Authority => 16,
            ContentType::JoinTopic => 17,
            ContentType::Block => 18,
        }
    }

    pub fn from_u64(value: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|ct| ct.as_u64() == value)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

impl From<ContentType> for u64 {
    fn from(ct: ContentType) -> u64 {
        ct.as_u64()
    }
}

/// Reference type for a pointer to a signed event.
pub const REFERENCE_TYPE_POINTER: u64 = 2;
/// Reference type for a blob identified by process and clock.
pub const REFERENCE_TYPE_BLOB: u64 = 3;

/// Digest type for SHA-256.
pub const DIGEST_TYPE_SHA256: u64 = 1;
