use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use skein_crypto::event_digest;
use skein_types::{
    ContentType, Event, EventKey, Pointer, Process, Range, RangesForSystem, Reference, SignedEvent,
    SignedEvents, System, SystemProcesses, WireMessage,
};
use tracing::{debug, warn};

use crate::cache::ResultCache;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::gateway::{Replica, ReplicaGateway, ReplicaSet};
use crate::verifier::{ReplicaFailure, SyncVerifier, VerificationReport, Verified, ViolationKind};

/// Wall-clock milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Result of posting one batch to one replica.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PostOutcome {
    pub replica: Replica,
    pub error: Option<String>,
}

impl PostOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-replica responses of one fan-out.
pub(crate) struct Gathered<T> {
    pub(crate) ok: Vec<(Replica, T)>,
    pub(crate) report: VerificationReport,
}

impl<T> Gathered<T> {
    /// Fail only when replicas were asked and none answered.
    pub(crate) fn require_any(self) -> SyncResult<(Vec<(Replica, T)>, VerificationReport)> {
        if self.ok.is_empty() && !self.report.failures.is_empty() {
            let last_error = self
                .report
                .failures
                .last()
                .map(|f| f.error.clone())
                .unwrap_or_default();
            return Err(SyncError::NoReplicaResponded {
                attempted: self.report.replicas_queried,
                last_error,
            });
        }
        Ok((self.ok, self.report))
    }
}

fn newer_first(a: &Event, b: &Event) -> Ordering {
    match (a.unix_milliseconds, b.unix_milliseconds) {
        (Some(ta), Some(tb)) => tb.cmp(&ta),
        _ => b.logical_clock.cmp(&a.logical_clock),
    }
}

/// Newest first: by timestamp when both events carry one, otherwise by clock.
///
/// That comparison is not a total order once timestamps are mixed, so this is
/// a stable insertion sort rather than `slice::sort_by`.
pub fn sort_newest_first(events: &mut Vec<Event>) {
    let unsorted = std::mem::take(events);
    for event in unsorted {
        let at = events
            .iter()
            .position(|placed| newer_first(&event, placed) == Ordering::Less)
            .unwrap_or(events.len());
        events.insert(at, event);
    }
}

fn push_unique(processes: &mut Vec<Process>, process: Process) {
    if !processes.contains(&process) {
        processes.push(process);
    }
}

/// Fans requests out over every replica and reconciles what comes back.
pub struct SyncEngine {
    gateway: Arc<dyn ReplicaGateway>,
    replicas: ReplicaSet,
    cache: Option<Arc<dyn ResultCache>>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn ReplicaGateway>, replicas: ReplicaSet, config: SyncConfig) -> Self {
        Self {
            gateway,
            replicas,
            cache: None,
            config,
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn replicas(&self) -> &ReplicaSet {
        &self.replicas
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn gateway(&self) -> &dyn ReplicaGateway {
        self.gateway.as_ref()
    }

    pub(crate) fn cache(&self) -> Option<&dyn ResultCache> {
        self.cache.as_deref()
    }

    /// Run `call` against every replica concurrently, each under the
    /// per-replica timeout, and wait for all of them to settle.
    pub(crate) async fn gather<T, F, Fut>(&self, call: F) -> Gathered<T>
    where
        F: Fn(Replica) -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let limit = self.config.replica_timeout();
        let calls = self.replicas.snapshot().into_iter().map(|replica| {
            let pending = call(replica.clone());
            async move {
                let result = tokio::time::timeout(limit, pending)
                    .await
                    .unwrap_or(Err(SyncError::Timeout(limit)));
                (replica, result)
            }
        });
        let settled = join_all(calls).await;

        let mut gathered = Gathered {
            ok: Vec::new(),
            report: VerificationReport {
                replicas_queried: settled.len(),
                ..VerificationReport::default()
            },
        };
        for (replica, result) in settled {
            match result {
                Ok(value) => {
                    gathered.report.replicas_responded += 1;
                    gathered.ok.push((replica, value));
                }
                Err(err) => {
                    warn!(replica = %replica, error = %err, "replica request failed");
                    gathered.report.failures.push(ReplicaFailure {
                        replica,
                        error: err.to_string(),
                    });
                }
            }
        }
        gathered
    }

    /// Apply the aggregate timeout to a whole operation.
    pub(crate) async fn bounded<T>(&self, op: impl Future<Output = SyncResult<T>>) -> SyncResult<T> {
        let limit = self.config.timeout();
        tokio::time::timeout(limit, op)
            .await
            .map_err(|_| SyncError::Timeout(limit))?
    }

    /// Post `signed` to every replica. Never fails; each outcome is reported.
    pub async fn send(&self, signed: &SignedEvent) -> Vec<PostOutcome> {
        let batch = SignedEvents::new(vec![signed.clone()]);
        let (gateway, batch) = (self.gateway(), &batch);
        let gathered = self
            .gather(|replica| async move { gateway.post_events(&replica, batch).await })
            .await;

        let mut outcomes: Vec<PostOutcome> = gathered
            .ok
            .into_iter()
            .map(|(replica, ())| PostOutcome {
                replica,
                error: None,
            })
            .collect();
        outcomes.extend(gathered.report.failures.into_iter().map(|failure| PostOutcome {
            replica: failure.replica,
            error: Some(failure.error),
        }));
        outcomes
    }

    /// Latest verified head events for `system`, newest first.
    pub async fn get_head_events(&self, system: &System) -> SyncResult<Vec<Event>> {
        Ok(self.get_head_events_with_report(system).await?.value)
    }

    pub async fn get_head_events_with_report(&self, system: &System) -> SyncResult<Verified<Vec<Event>>> {
        self.bounded(self.head_events(system)).await
    }

    pub(crate) async fn head_events(&self, system: &System) -> SyncResult<Verified<Vec<Event>>> {
        let gateway = self.gateway();
        let (responses, mut report) = self
            .gather(|replica| async move { gateway.get_head(&replica, system).await })
            .await
            .require_any()?;

        let mut events: Vec<Event> = Vec::new();
        for (replica, batch) in &responses {
            for signed in batch {
                let Some(event) = SyncVerifier::for_system(replica, system, signed, &mut report) else {
                    continue;
                };
                let seen = events
                    .iter()
                    .any(|e| e.process == event.process && e.logical_clock == event.logical_clock);
                if !seen {
                    events.push(event);
                }
            }
        }
        sort_newest_first(&mut events);
        debug!(system = %system, heads = events.len(), "head events gathered");
        Ok(Verified {
            value: events,
            report,
        })
    }

    /// Every process known for `system`: head authors plus roster members.
    pub async fn discover_processes(&self, system: &System) -> SyncResult<Vec<Process>> {
        let heads = self.get_head_events(system).await?;
        let mut processes = Vec::new();
        for head in &heads {
            push_unique(&mut processes, head.process.clone());
            if head.is(ContentType::SystemProcesses) {
                match SystemProcesses::decode(&head.content) {
                    Ok(roster) => roster
                        .processes
                        .into_iter()
                        .for_each(|p| push_unique(&mut processes, p)),
                    Err(err) => warn!(system = %system, error = %err, "undecodable roster ignored"),
                }
            }
        }
        Ok(processes)
    }

    /// Verified events of `content_type` referencing `reference`, deduplicated
    /// across replicas and ordered oldest first.
    ///
    /// `page_limit` caps the number of pages fetched from each replica.
    pub async fn query_events_referencing(
        &self,
        reference: &Reference,
        content_type: u64,
        page_limit: Option<u32>,
    ) -> SyncResult<Vec<Event>> {
        Ok(self
            .query_events_referencing_with_report(reference, content_type, page_limit)
            .await?
            .value)
    }

    pub async fn query_events_referencing_with_report(
        &self,
        reference: &Reference,
        content_type: u64,
        page_limit: Option<u32>,
    ) -> SyncResult<Verified<Vec<Event>>> {
        self.bounded(async {
            let gateway = self.gateway();
            let pages = page_limit.unwrap_or(1).max(1);
            let (responses, mut report) = self
                .gather(|replica| async move {
                    let mut response = gateway
                        .get_query_references(&replica, reference, None, content_type)
                        .await?;
                    for _ in 1..pages {
                        let Some(cursor) = response.next_cursor().map(<[u8]>::to_vec) else {
                            break;
                        };
                        let page = gateway
                            .get_query_references(&replica, reference, Some(cursor.as_slice()), content_type)
                            .await?;
                        response.extend(page);
                    }
                    Ok::<_, SyncError>(response)
                })
                .await
                .require_any()?;

            let mut reconciled: BTreeMap<EventKey, Event> = BTreeMap::new();
            for (replica, response) in &responses {
                for signed in response.items.iter().filter_map(|item| item.event.as_ref()) {
                    if let Some(event) = SyncVerifier::self_signed(replica, signed, &mut report) {
                        reconciled.insert(event.key(), event);
                    }
                }
            }
            let mut events: Vec<Event> = reconciled.into_values().collect();
            events.sort_by_key(|e| e.unix_milliseconds.unwrap_or(0));
            Ok(Verified {
                value: events,
                report,
            })
        })
        .await
    }

    /// Events referencing a specific event.
    pub async fn query_referencing_pointer(
        &self,
        pointer: &Pointer,
        content_type: u64,
        page_limit: Option<u32>,
    ) -> SyncResult<Vec<Event>> {
        let reference = Reference::from_pointer(pointer)?;
        self.query_events_referencing(&reference, content_type, page_limit)
            .await
    }

    /// Events referencing an opaque blob such as a URL.
    pub async fn query_referencing_blob(
        &self,
        blob: &[u8],
        content_type: u64,
        page_limit: Option<u32>,
    ) -> SyncResult<Vec<Event>> {
        let reference = Reference::from_blob(blob);
        self.query_events_referencing(&reference, content_type, page_limit)
            .await
    }

    /// The event `pointer` addresses, if any replica serves a copy whose
    /// digest and signature both check out.
    pub async fn deref_pointer_event(&self, pointer: &Pointer) -> SyncResult<Option<Event>> {
        Ok(self.deref_pointer_event_with_report(pointer).await?.value)
    }

    pub async fn deref_pointer_event_with_report(
        &self,
        pointer: &Pointer,
    ) -> SyncResult<Verified<Option<Event>>> {
        self.bounded(async {
            let gateway = self.gateway();
            let ranges = RangesForSystem::single(
                pointer.process.clone(),
                vec![Range::single(pointer.logical_clock)],
            );
            let (system, ranges) = (&pointer.system, &ranges);
            let (responses, mut report) = self
                .gather(|replica| async move { gateway.get_events(&replica, system, ranges).await })
                .await
                .require_any()?;

            let mut found = None;
            for (replica, batch) in &responses {
                if batch.len() > 1 {
                    warn!(replica = %replica, count = batch.len(), "multiple events for a single pointer");
                    report.record(replica, ViolationKind::MultipleEvents { count: batch.len() });
                }
                for signed in batch {
                    if event_digest(signed) != pointer.event_digest {
                        warn!(
                            replica = %replica,
                            system = %pointer.system,
                            logical_clock = pointer.logical_clock,
                            "digest mismatch, event tampered"
                        );
                        report.record(replica, ViolationKind::DigestMismatch);
                        continue;
                    }
                    let Some(event) = SyncVerifier::for_system(replica, system, signed, &mut report) else {
                        continue;
                    };
                    if found.is_none() {
                        found = Some(event);
                    }
                }
            }
            Ok(Verified {
                value: found,
                report,
            })
        })
        .await
    }
}
