use std::collections::BTreeMap;

use skein_crypto::{derive_public_key, sign_event, CryptoError};
use skein_types::{
    clock_after, ContentType, Event, Index, Indices, PostHead, PrivateKey, Process, SignedEvent,
    System, SystemProcesses, VectorClock, WireMessage,
};
use tracing::{info, warn};

use crate::engine::{now_ms, SyncEngine};
use crate::error::SyncResult;

/// A reconciled write head plus any roster events authored to reach it.
#[derive(Debug)]
pub struct Bootstrap {
    pub head: PostHead,
    pub created: Vec<SignedEvent>,
}

/// Content types whose index may be borrowed from any process's head.
const SHARED_INDEX_TYPES: [ContentType; 4] = [
    ContentType::Avatar,
    ContentType::Username,
    ContentType::Server,
    ContentType::Post,
];

/// Highest index per content type seen across `heads`, counting each head
/// itself as an index of its own type. A `SystemProcesses` index is only
/// taken from heads written by `my_process`.
pub fn reconcile_indices(heads: &[Event], my_process: &Process) -> Indices {
    let mut latest: BTreeMap<u64, u64> = BTreeMap::new();
    for head in heads {
        let own = Index::new(head.content_type, head.logical_clock);
        for index in head.indices.indices.iter().copied().chain(std::iter::once(own)) {
            let trusted = match ContentType::from_u64(index.index_type) {
                Some(ContentType::SystemProcesses) => head.process == *my_process,
                Some(content_type) => SHARED_INDEX_TYPES.contains(&content_type),
                None => false,
            };
            if trusted {
                let clock = latest.entry(index.index_type).or_insert(index.logical_clock);
                *clock = (*clock).max(index.logical_clock);
            }
        }
    }
    Indices::new(latest.into_iter().map(|(t, c)| Index::new(t, c)).collect())
}

/// Highest observed clock per process other than `my_process`, first-seen order.
fn observed_roster(heads: &[Event], my_process: &Process) -> (Vec<Process>, Vec<u64>) {
    let mut processes: Vec<Process> = Vec::new();
    let mut clocks: Vec<u64> = Vec::new();
    for head in heads.iter().filter(|h| h.process != *my_process) {
        match processes.iter().position(|p| *p == head.process) {
            Some(slot) => clocks[slot] = clocks[slot].max(head.logical_clock),
            None => {
                processes.push(head.process.clone());
                clocks.push(head.logical_clock);
            }
        }
    }
    (processes, clocks)
}

fn max_clock<'a>(heads: impl IntoIterator<Item = &'a Event>) -> u64 {
    heads.into_iter().map(|h| h.logical_clock).max().unwrap_or(0)
}

struct Signer<'a> {
    system: &'a System,
    private_key: &'a PrivateKey,
    my_process: &'a Process,
}

impl SyncEngine {
    /// Reconstruct a safe write head for `my_process` from what the replicas
    /// report, authoring a new roster event when the network does not know
    /// this process or its last roster is stale.
    ///
    /// The returned clock is greater than every clock observed for `system`.
    pub async fn find_or_create_post_head(
        &self,
        system: &System,
        private_key: &PrivateKey,
        my_process: &Process,
    ) -> SyncResult<Bootstrap> {
        if derive_public_key(private_key)? != *system {
            return Err(CryptoError::InvalidKey("private key does not belong to system".into()).into());
        }
        let signer = Signer {
            system,
            private_key,
            my_process,
        };

        let heads = self.get_head_events(system).await?;
        let indices = reconcile_indices(&heads, my_process);

        let mut known: Vec<Process> = Vec::new();
        for head in &heads {
            if !known.contains(&head.process) {
                known.push(head.process.clone());
            }
        }
        let process_seen = known.contains(my_process);
        known.retain(|p| p != my_process);

        let last_roster = process_seen
            .then(|| {
                heads
                    .iter()
                    .find(|h| h.process == *my_process && h.is(ContentType::SystemProcesses))
            })
            .flatten()
            .and_then(|h| match SystemProcesses::decode(&h.content) {
                Ok(roster) => Some((h, roster)),
                Err(err) => {
                    warn!(system = %system, error = %err, "own roster undecodable, starting over");
                    None
                }
            });

        match last_roster {
            Some((roster_event, roster)) => {
                self.resume(&signer, &heads, &known, roster_event, roster, indices)
                    .await
            }
            None => self.start_fresh(&signer, &heads, indices).await,
        }
    }

    /// Our process already published a roster.
    async fn resume(
        &self,
        signer: &Signer<'_>,
        heads: &[Event],
        known: &[Process],
        roster_event: &Event,
        roster: SystemProcesses,
        mut indices: Indices,
    ) -> SyncResult<Bootstrap> {
        let mut processes = roster.processes;
        let mut clocks = roster_event.vector_clock.logical_clocks.clone();
        clocks.resize(processes.len(), 0);

        let hidden: Vec<String> = processes
            .iter()
            .filter(|p| !known.contains(p) && *p != signer.my_process)
            .map(Process::to_hex)
            .collect();
        if !hidden.is_empty() {
            warn!(system = %signer.system, ?hidden, "replicas may be hiding known processes");
        }

        let missing: Vec<String> = known
            .iter()
            .filter(|p| !processes.contains(p))
            .map(Process::to_hex)
            .collect();

        let mut created = Vec::new();
        let mut new_roster = None;
        if !missing.is_empty() {
            info!(system = %signer.system, ?missing, "own roster is stale, publishing an update");
            let (signed, event, roster_processes) = self.publish_roster(signer, heads, &indices).await?;
            processes = roster_processes;
            clocks = event.vector_clock.logical_clocks.clone();
            indices.upsert(ContentType::SystemProcesses, event.logical_clock);
            created.push(signed);
            new_roster = Some(event);
        } else {
            info!(system = %signer.system, "resuming from own roster");
        }

        let mut max_clock = 0;
        for head in heads.iter().chain(new_roster.iter()) {
            max_clock = max_clock.max(head.logical_clock);
            if head.process == *signer.my_process {
                continue;
            }
            match processes.iter().position(|p| *p == head.process) {
                Some(slot) => clocks[slot] = clocks[slot].max(head.logical_clock),
                None => {
                    processes.push(head.process.clone());
                    clocks.push(head.logical_clock);
                }
            }
        }

        Ok(Bootstrap {
            head: PostHead {
                system: signer.system.clone(),
                process: signer.my_process.clone(),
                logical_clock: clock_after(max_clock)?,
                vector_clock: VectorClock::new(clocks),
                processes,
                private_key: signer.private_key.clone(),
                indices,
            },
            created,
        })
    }

    /// The network has no usable roster from our process.
    async fn start_fresh(
        &self,
        signer: &Signer<'_>,
        heads: &[Event],
        mut indices: Indices,
    ) -> SyncResult<Bootstrap> {
        info!(system = %signer.system, process = %signer.my_process, "process not synchronized, publishing a roster");
        let (signed, event, processes) = self.publish_roster(signer, heads, &indices).await?;
        indices.upsert(ContentType::SystemProcesses, event.logical_clock);
        Ok(Bootstrap {
            head: PostHead {
                system: signer.system.clone(),
                process: signer.my_process.clone(),
                logical_clock: clock_after(event.logical_clock)?,
                vector_clock: event.vector_clock,
                processes,
                private_key: signer.private_key.clone(),
                indices,
            },
            created: vec![signed],
        })
    }

    /// Sign a roster of every other observed process and broadcast it.
    /// Broadcast failures are logged; the event is returned regardless.
    async fn publish_roster(
        &self,
        signer: &Signer<'_>,
        heads: &[Event],
        indices: &Indices,
    ) -> SyncResult<(SignedEvent, Event, Vec<Process>)> {
        let (processes, clocks) = observed_roster(heads, signer.my_process);
        let event = Event {
            system: signer.system.clone(),
            process: signer.my_process.clone(),
            logical_clock: clock_after(max_clock(heads))?,
            content_type: ContentType::SystemProcesses.as_u64(),
            content: SystemProcesses {
                processes: processes.clone(),
            }
            .encode()?,
            vector_clock: VectorClock::new(clocks),
            indices: indices.clone(),
            lww_element_set: None,
            lww_element: None,
            references: Vec::new(),
            unix_milliseconds: Some(now_ms()),
        };
        let signed = sign_event(signer.private_key, &event)?;
        for outcome in self.send(&signed).await.iter().filter(|o| !o.is_success()) {
            warn!(replica = %outcome.replica, error = ?outcome.error, "roster broadcast failed");
        }
        Ok((signed, event, processes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{network, process, Identity, Network};
    use crate::post::create_signed_post_event;
    use proptest::prelude::*;
    use skein_crypto::open_for_system;

    fn roster_of(signed: &SignedEvent) -> (Event, Vec<Process>) {
        let event = signed.decode_event().unwrap();
        let roster = SystemProcesses::decode(&event.content).unwrap();
        (event, roster.processes)
    }

    async fn bootstrap(net: &Network, me: &Identity, p: &Process) -> Bootstrap {
        net.engine
            .find_or_create_post_head(&me.system, &me.private_key, p)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn fresh_system_publishes_empty_roster() {
        let net = network(2);
        let me = Identity::new();
        let p = process();
        let boot = bootstrap(&net, &me, &p).await;

        assert_eq!(boot.created.len(), 1);
        let (event, members) = roster_of(&boot.created[0]);
        assert!(open_for_system(&me.system, &boot.created[0]).is_ok());
        assert_eq!(event.logical_clock, 1);
        assert!(members.is_empty());
        assert_eq!(boot.head.logical_clock, 2);
        assert_eq!(boot.head.indices.get(ContentType::SystemProcesses), Some(1));
        for url in &net.urls {
            assert_eq!(net.replicas.events_on(url).len(), 1);
        }
    }

    #[tokio::test]
    async fn unknown_process_gets_roster_of_others() {
        let net = network(1);
        let me = Identity::new();
        let (other, mine) = (process(), process());
        net.seed_all(&me.signed(&other, 3, ContentType::Post));
        net.seed_all(&me.signed(&other, 9, ContentType::Username));

        let boot = bootstrap(&net, &me, &mine).await;
        let (event, members) = roster_of(&boot.created[0]);
        assert_eq!(members, vec![other.clone()]);
        assert_eq!(event.vector_clock.logical_clocks, vec![9]);
        assert_eq!(event.logical_clock, 10);
        assert_eq!(boot.head.logical_clock, 11);
        assert_eq!(boot.head.processes, vec![other]);
        assert_eq!(boot.head.vector_clock.logical_clocks, vec![9]);
        assert_eq!(boot.head.indices.get(ContentType::Username), Some(9));
    }

    #[tokio::test]
    async fn second_bootstrap_resumes_without_new_events() {
        let net = network(2);
        let me = Identity::new();
        let (other, mine) = (process(), process());
        net.seed_all(&me.signed(&other, 4, ContentType::Post));

        let first = bootstrap(&net, &me, &mine).await;
        assert_eq!(first.created.len(), 1);
        let second = bootstrap(&net, &me, &mine).await;
        assert!(second.created.is_empty());
        assert_eq!(second.head.logical_clock, first.head.logical_clock);
        assert_eq!(second.head.processes, first.head.processes);
        assert_eq!(second.head.vector_clock, first.head.vector_clock);
    }

    #[tokio::test]
    async fn stale_roster_is_republished() {
        let net = network(1);
        let me = Identity::new();
        let (a, b, mine) = (process(), process(), process());
        net.seed_all(&me.roster(&mine, 5, &[(a.clone(), 2)]));
        net.seed_all(&me.signed(&a, 6, ContentType::Post));
        net.seed_all(&me.signed(&b, 8, ContentType::Post));

        let boot = bootstrap(&net, &me, &mine).await;
        assert_eq!(boot.created.len(), 1);
        let (event, members) = roster_of(&boot.created[0]);
        assert_eq!(event.logical_clock, 9);
        assert_eq!(members.len(), 2);
        assert!(members.contains(&a) && members.contains(&b));
        assert_eq!(boot.head.logical_clock, 10);
        assert_eq!(boot.head.processes.len(), boot.head.vector_clock.logical_clocks.len());
        assert_eq!(boot.head.indices.get(ContentType::SystemProcesses), Some(9));
    }

    #[tokio::test]
    async fn current_roster_raises_vector_clock() {
        let net = network(1);
        let me = Identity::new();
        let (a, mine) = (process(), process());
        net.seed_all(&me.roster(&mine, 5, &[(a.clone(), 2)]));
        net.seed_all(&me.signed(&a, 7, ContentType::Post));

        let boot = bootstrap(&net, &me, &mine).await;
        assert!(boot.created.is_empty());
        assert_eq!(boot.head.processes, vec![a]);
        assert_eq!(boot.head.vector_clock.logical_clocks, vec![7]);
        assert_eq!(boot.head.logical_clock, 8);
    }

    #[tokio::test]
    async fn roster_members_missing_from_heads_are_kept() {
        let net = network(1);
        let me = Identity::new();
        let (a, ghost, mine) = (process(), process(), process());
        net.seed_all(&me.roster(&mine, 5, &[(a.clone(), 2), (ghost.clone(), 3)]));
        net.seed_all(&me.signed(&a, 2, ContentType::Post));

        let boot = bootstrap(&net, &me, &mine).await;
        assert!(boot.created.is_empty());
        assert_eq!(net.replicas.events_on(&net.urls[0]).len(), 2);
        let slot = boot.head.processes.iter().position(|p| *p == ghost).unwrap();
        assert_eq!(boot.head.vector_clock.logical_clocks[slot], 3);
        assert_eq!(boot.head.processes.len(), 2);
        assert_eq!(boot.head.logical_clock, 6);
    }

    #[tokio::test]
    async fn exhausted_clock_is_an_error() {
        let net = network(1);
        let me = Identity::new();
        let (other, mine) = (process(), process());
        net.seed_all(&me.signed(&other, u64::MAX, ContentType::Post));
        let err = net
            .engine
            .find_or_create_post_head(&me.system, &me.private_key, &mine)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::SyncError::Type(skein_types::TypeError::ClockExhausted(u64::MAX))
        ));
        assert_eq!(net.replicas.events_on(&net.urls[0]).len(), 1);
    }

    #[tokio::test]
    async fn exhausted_clock_on_resume_is_an_error() {
        let net = network(1);
        let me = Identity::new();
        let (a, mine) = (process(), process());
        net.seed_all(&me.roster(&mine, 5, &[(a.clone(), 2)]));
        net.seed_all(&me.signed(&a, u64::MAX, ContentType::Post));
        let err = net
            .engine
            .find_or_create_post_head(&me.system, &me.private_key, &mine)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::Type(_)));
    }

    #[tokio::test]
    async fn own_post_head_forces_fresh_roster_past_it() {
        let net = network(1);
        let me = Identity::new();
        let mine = process();
        net.seed_all(&me.signed(&mine, 12, ContentType::Post));
        let boot = bootstrap(&net, &me, &mine).await;
        let (event, members) = roster_of(&boot.created[0]);
        assert!(members.is_empty());
        assert_eq!(event.logical_clock, 13);
        assert_eq!(boot.head.logical_clock, 14);
    }

    #[tokio::test]
    async fn broadcast_failure_still_returns_event() {
        let net = network(2);
        net.replicas.set_failing(&net.urls[1], true);
        let me = Identity::new();
        let boot = bootstrap(&net, &me, &process()).await;
        assert_eq!(boot.created.len(), 1);
        assert_eq!(net.replicas.events_on(&net.urls[0]).len(), 1);
        assert!(net.replicas.events_on(&net.urls[1]).is_empty());
    }

    #[tokio::test]
    async fn mismatched_key_is_rejected() {
        let net = network(1);
        let me = Identity::new();
        let stranger = Identity::new();
        let err = net
            .engine
            .find_or_create_post_head(&me.system, &stranger.private_key, &process())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::SyncError::Crypto(_)));
    }

    #[tokio::test]
    async fn posts_after_bootstrap_continue_the_clock() {
        let net = network(1);
        let me = Identity::new();
        let mine = process();
        let mut head = bootstrap(&net, &me, &mine).await.head;
        let signed = create_signed_post_event(&mut head, "first", vec![], None).unwrap();
        net.engine.send(&signed).await;
        let again = bootstrap(&net, &me, &mine).await;
        assert!(again.head.logical_clock > signed.decode_event().unwrap().logical_clock);
    }

    #[test]
    fn foreign_roster_index_is_ignored() {
        let me = Identity::new();
        let (mine, other) = (process(), process());
        let mut theirs = me.event(&other, 20, ContentType::SystemProcesses);
        theirs.indices.upsert(ContentType::Post, 4);
        let own = me.event(&mine, 3, ContentType::SystemProcesses);
        let indices = reconcile_indices(&[theirs, own], &mine);
        assert_eq!(indices.get(ContentType::SystemProcesses), Some(3));
        assert_eq!(indices.get(ContentType::Post), Some(4));
    }

    #[test]
    fn unshared_index_types_are_dropped() {
        let me = Identity::new();
        let p = process();
        let mut head = me.event(&p, 6, ContentType::Follow);
        head.indices.upsert(ContentType::Avatar, 2);
        head.indices.upsert(ContentType::Avatar, 5);
        let indices = reconcile_indices(&[head], &p);
        assert_eq!(indices.get(ContentType::Follow), None);
        assert_eq!(indices.get(ContentType::Avatar), Some(5));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn next_clock_exceeds_everything_observed(
            heads in prop::collection::vec((0usize..4, 1u64..1_000, any::<bool>()), 0..8),
            split in any::<bool>(),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            runtime.block_on(async {
                let net = network(2);
                let me = Identity::new();
                let processes: Vec<Process> = (0..4).map(|_| process()).collect();
                let mine = processes[0].clone();
                let mut observed = 0;
                for (i, (who, clock, roster)) in heads.iter().enumerate() {
                    let author = &processes[*who];
                    let signed = if *roster {
                        me.roster(author, *clock, &[(processes[(who + 1) % 4].clone(), clock / 2)])
                    } else {
                        me.signed(author, *clock, ContentType::Post)
                    };
                    if split {
                        net.replicas.seed(&net.urls[i % 2], signed);
                    } else {
                        net.seed_all(&signed);
                    }
                    observed = observed.max(*clock);
                }
                let boot = bootstrap(&net, &me, &mine).await;
                prop_assert!(boot.head.logical_clock > observed);
                prop_assert_eq!(boot.head.processes.len(), boot.head.vector_clock.logical_clocks.len());
                for signed in &boot.created {
                    prop_assert!(signed.decode_event().unwrap().logical_clock > observed);
                }
                Ok(())
            })?;
        }
    }
}
