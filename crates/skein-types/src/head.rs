use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clock::{clock_after, Indices, VectorClock};
use crate::content::ContentType;
use crate::error::TypeResult;
use crate::event::{Event, Reference};
use crate::identity::{PrivateKey, Process, System};
use crate::payload::{ImageManifest, Post};
use crate::wire::WireMessage;

/// The mutable write cursor for one (system, process).
///
/// Deliberately not `Clone`: two live heads for the same process can emit
/// duplicate clocks. Callers hold it inside their post critical section and
/// persist it after every mutation.
#[derive(Serialize, Deserialize, PartialEq, Eq)]
pub struct PostHead {
    pub system: System,
    pub process: Process,
    /// Clock the next event will carry.
    pub logical_clock: u64,
    pub vector_clock: VectorClock,
    /// Processes aligned with `vector_clock`.
    pub processes: Vec<Process>,
    pub private_key: PrivateKey,
    pub indices: Indices,
}

impl PostHead {
    /// Build the next event at the current clock without advancing.
    pub fn next_event(
        &self,
        content_type: ContentType,
        content: Vec<u8>,
        references: Vec<Reference>,
        unix_milliseconds: u64,
    ) -> Event {
        Event {
            system: self.system.clone(),
            process: self.process.clone(),
            logical_clock: self.logical_clock,
            content_type: content_type.as_u64(),
            content,
            vector_clock: self.vector_clock.clone(),
            indices: self.indices.clone(),
            lww_element_set: None,
            lww_element: None,
            references,
            unix_milliseconds: Some(unix_milliseconds),
        }
    }

    /// Build a `Post` event at the current clock.
    pub fn next_post_event(
        &self,
        text: &str,
        references: Vec<Reference>,
        image: Option<ImageManifest>,
        unix_milliseconds: u64,
    ) -> TypeResult<Event> {
        let post = Post {
            content: text.to_owned(),
            image,
        };
        Ok(self.next_event(ContentType::Post, post.encode()?, references, unix_milliseconds))
    }

    /// Record that `event` was emitted: refresh its content-type index and
    /// move the clock past it. Nothing changes when the clock cannot move.
    pub fn advance(&mut self, event: &Event) -> TypeResult<()> {
        let next = clock_after(event.logical_clock)?;
        if let Some(content_type) = event.kind() {
            self.indices.upsert(content_type, event.logical_clock);
        }
        self.logical_clock = self.logical_clock.max(next);
        Ok(())
    }
}

impl fmt::Debug for PostHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostHead")
            .field("system", &self.system)
            .field("process", &self.process)
            .field("logical_clock", &self.logical_clock)
            .field("vector_clock", &self.vector_clock.logical_clocks)
            .field("processes", &self.processes)
            .field("private_key", &self.private_key)
            .field("indices", &self.indices.indices)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Index;
    use crate::identity::KEY_TYPE_ED25519;

    fn head() -> PostHead {
        PostHead {
            system: System::new(KEY_TYPE_ED25519, vec![1; 32]),
            process: Process::new(vec![2; 16]),
            logical_clock: 7,
            vector_clock: VectorClock::new(vec![4]),
            processes: vec![Process::new(vec![3; 16])],
            private_key: PrivateKey::new(KEY_TYPE_ED25519, vec![9; 32]),
            indices: Indices::new(vec![Index::new(ContentType::SystemProcesses.as_u64(), 6)]),
        }
    }

    #[test]
    fn post_event_carries_current_state() {
        let head = head();
        let event = head.next_post_event("hi", vec![], None, 1000).unwrap();
        assert_eq!(event.logical_clock, 7);
        assert_eq!(event.indices, head.indices);
        assert_eq!(event.vector_clock.logical_clocks, vec![4]);
        assert_eq!(Post::decode(&event.content).unwrap().content, "hi");
    }

    #[test]
    fn advance_increments_and_upserts_index() {
        let mut head = head();
        let event = head.next_post_event("hi", vec![], None, 1000).unwrap();
        head.advance(&event).unwrap();
        assert_eq!(head.logical_clock, 8);
        assert_eq!(head.indices.get(ContentType::Post), Some(7));
        assert_eq!(head.indices.get(ContentType::SystemProcesses), Some(6));

        let second = head.next_post_event("again", vec![], None, 1001).unwrap();
        assert_eq!(second.indices.get(ContentType::Post), Some(7));
        head.advance(&second).unwrap();
        assert_eq!(head.indices.get(ContentType::Post), Some(8));
    }

    #[test]
    fn advance_refuses_to_wrap() {
        let mut head = head();
        head.logical_clock = u64::MAX;
        let event = head.next_post_event("last", vec![], None, 1000).unwrap();
        assert_eq!(head.advance(&event), Err(crate::TypeError::ClockExhausted(u64::MAX)));
        assert_eq!(head.logical_clock, u64::MAX);
        assert_eq!(head.indices.get(ContentType::Post), None);
    }

    #[test]
    fn debug_redacts_private_key() {
        let rendered = format!("{:?}", head());
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains(&"09".repeat(32)));
    }

    #[test]
    fn serde_roundtrip() {
        let head = head();
        let json = serde_json::to_string(&head).unwrap();
        let restored: PostHead = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, head);
    }
}
