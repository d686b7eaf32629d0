use std::fmt;

use skein_crypto::{open_for_system, open_self_signed, Rejection};
use skein_types::{Event, SignedEvent, System};
use tracing::warn;

use crate::gateway::Replica;

/// Something a replica returned that was dropped or flagged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// Signature did not verify.
    BadSignature,
    /// Event bytes did not decode.
    Malformed(String),
    /// Validly signed by a system other than the one requested.
    ForeignSystem,
    /// Event digest differs from the pointer being dereferenced.
    DigestMismatch,
    /// A single-event range came back with more than one event.
    MultipleEvents { count: usize },
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::BadSignature => f.write_str("bad signature"),
            ViolationKind::Malformed(reason) => write!(f, "malformed event: {reason}"),
            ViolationKind::ForeignSystem => f.write_str("event from another system"),
            ViolationKind::DigestMismatch => f.write_str("digest mismatch"),
            ViolationKind::MultipleEvents { count } => {
                write!(f, "{count} events for a single-event range")
            }
        }
    }
}

impl From<Rejection> for ViolationKind {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::BadSignature => ViolationKind::BadSignature,
            Rejection::Malformed(err) => ViolationKind::Malformed(err.to_string()),
            Rejection::ForeignSystem => ViolationKind::ForeignSystem,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub replica: Replica,
    pub kind: ViolationKind,
}

/// A replica whose request failed outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplicaFailure {
    pub replica: Replica,
    pub error: String,
}

/// What happened across the replicas of one fan-out.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    pub replicas_queried: usize,
    pub replicas_responded: usize,
    pub failures: Vec<ReplicaFailure>,
    pub violations: Vec<Violation>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn record(&mut self, replica: &Replica, kind: ViolationKind) {
        self.violations.push(Violation {
            replica: replica.clone(),
            kind,
        });
    }

    /// Violations blamed on `replica`.
    pub fn blamed(&self, replica: &Replica) -> impl Iterator<Item = &Violation> {
        let replica = replica.clone();
        self.violations.iter().filter(move |v| v.replica == replica)
    }
}

/// A result together with the report of how it was obtained.
#[derive(Clone, Debug)]
pub struct Verified<T> {
    pub value: T,
    pub report: VerificationReport,
}

/// Signature checks that drop and warn instead of failing.
pub struct SyncVerifier;

impl SyncVerifier {
    /// Accept `signed` only if it verifies against `system`.
    pub fn for_system(
        replica: &Replica,
        system: &System,
        signed: &SignedEvent,
        report: &mut VerificationReport,
    ) -> Option<Event> {
        match open_for_system(system, signed) {
            Ok(event) => Some(event),
            Err(rejection) => {
                warn!(replica = %replica, system = %system, reason = %rejection, "tampered event dropped");
                report.record(replica, rejection.into());
                None
            }
        }
    }

    /// Accept `signed` only if it verifies against the system it claims.
    pub fn self_signed(
        replica: &Replica,
        signed: &SignedEvent,
        report: &mut VerificationReport,
    ) -> Option<Event> {
        match open_self_signed(signed) {
            Ok(event) => Some(event),
            Err(rejection) => {
                warn!(replica = %replica, reason = %rejection, "tampered event dropped");
                report.record(replica, rejection.into());
                None
            }
        }
    }
}
