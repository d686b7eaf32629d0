use skein_crypto::sign_event;
use skein_types::{ImageManifest, PostHead, Reference, SignedEvent};

use crate::engine::now_ms;
use crate::error::SyncResult;

/// Sign a new `Post` at the head's current clock, then advance the head.
///
/// The head is left untouched if encoding or signing fails. Callers persist
/// it before releasing their post lock.
pub fn create_signed_post_event(
    head: &mut PostHead,
    text: &str,
    references: Vec<Reference>,
    image: Option<ImageManifest>,
) -> SyncResult<SignedEvent> {
    let event = head.next_post_event(text, references, image, now_ms())?;
    let signed = sign_event(&head.private_key, &event)?;
    head.advance(&event)?;
    Ok(signed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_crypto::{derive_public_key, generate_private_key, open_for_system, random_process_id};
    use skein_types::{ContentType, Indices, Post, VectorClock, WireMessage};

    fn head() -> PostHead {
        let private_key = generate_private_key();
        PostHead {
            system: derive_public_key(&private_key).unwrap(),
            process: random_process_id(),
            logical_clock: 3,
            vector_clock: VectorClock::default(),
            processes: vec![],
            private_key,
            indices: Indices::default(),
        }
    }

    #[test]
    fn post_is_signed_and_head_advances() {
        let mut head = head();
        let signed = create_signed_post_event(&mut head, "hello", vec![Reference::from_blob(b"u".to_vec())], None).unwrap();
        let event = open_for_system(&head.system, &signed).unwrap();
        assert_eq!(event.logical_clock, 3);
        assert!(event.is(ContentType::Post));
        assert_eq!(event.references.len(), 1);
        assert_eq!(Post::decode(&event.content).unwrap().content, "hello");
        assert!(event.unix_milliseconds.is_some());

        assert_eq!(head.logical_clock, 4);
        assert_eq!(head.indices.get(ContentType::Post), Some(3));
    }

    #[test]
    fn post_at_last_clock_leaves_head_alone() {
        let mut head = head();
        head.logical_clock = u64::MAX;
        let err = create_signed_post_event(&mut head, "late", vec![], None).unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Type(skein_types::TypeError::ClockExhausted(u64::MAX))
        ));
        assert_eq!(head.logical_clock, u64::MAX);
        assert_eq!(head.indices.get(ContentType::Post), None);
    }

    #[test]
    fn consecutive_posts_have_increasing_clocks() {
        let mut head = head();
        let clocks: Vec<u64> = (0..3)
            .map(|i| {
                let signed = create_signed_post_event(&mut head, &format!("n{i}"), vec![], None).unwrap();
                signed.decode_event().unwrap().logical_clock
            })
            .collect();
        assert_eq!(clocks, vec![3, 4, 5]);
    }
}
