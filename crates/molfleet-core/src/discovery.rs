//! Discovery run bookkeeping
//!
//! A run consumes one push stream. Each descriptor is folded into the
//! registry; the run counts the non-self answers and decides how the run
//! ended once the stream stops.

use tracing::debug;

use molfleet_api::{FleetEvent, HostDescriptor};

use crate::registry::{HostId, HostRegistry, Upsert};

/// How a descriptor was absorbed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// The answer came from the coordinator's own node; not counted
    OwnNode,
    /// Nothing identifies the answer; not counted
    Ignored,
    Created(HostId),
    Merged(HostId),
}

/// Why the stream stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEnd {
    /// The server sent its completion signal
    Completed,
    /// Transport failed or the stream closed early
    Interrupted(String),
}

/// Final state of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Completed { count: usize },
    Failed { message: String },
}

impl DiscoveryOutcome {
    #[must_use]
    pub fn into_event(self) -> FleetEvent {
        match self {
            DiscoveryOutcome::Completed { count } => FleetEvent::DiscoveryCompleted { count },
            DiscoveryOutcome::Failed { message } => FleetEvent::DiscoveryFailed { message },
        }
    }
}

/// One discovery pass
#[derive(Debug, Clone)]
pub struct DiscoveryRun {
    id: u64,
    count: usize,
}

impl DiscoveryRun {
    #[must_use]
    pub fn new(id: u64) -> Self {
        Self { id, count: 0 }
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Non-self answers absorbed so far
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Fold one streamed descriptor into `registry`
    ///
    /// A descriptor flagged as the own node only contributes the address it
    /// answered on. One that resolves to the own node by identity merges
    /// into it. Neither is counted.
    pub fn ingest(&mut self, registry: &mut HostRegistry, descriptor: &HostDescriptor) -> Ingested {
        if descriptor.is_self {
            if let Some(ip) = descriptor.responded_from_ip() {
                registry.note_self_response(ip);
            }
            debug!(run = self.id, "own node answered discovery");
            return Ingested::OwnNode;
        }

        match registry.upsert(descriptor) {
            Upsert::Ignored => {
                debug!(run = self.id, "discarding answer without identity");
                Ingested::Ignored
            }
            Upsert::Merged(id) if id.is_self() => Ingested::OwnNode,
            Upsert::Merged(id) => {
                self.count += 1;
                Ingested::Merged(id)
            }
            Upsert::Created(id) => {
                self.count += 1;
                Ingested::Created(id)
            }
        }
    }

    /// Decide the outcome
    ///
    /// An interruption after at least one answer still counts as completed.
    #[must_use]
    pub fn finish(&self, end: DiscoveryEnd) -> DiscoveryOutcome {
        match end {
            DiscoveryEnd::Completed => DiscoveryOutcome::Completed { count: self.count },
            DiscoveryEnd::Interrupted(message) if self.count == 0 => {
                DiscoveryOutcome::Failed { message }
            }
            DiscoveryEnd::Interrupted(message) => {
                debug!(run = self.id, count = self.count, %message, "discovery interrupted after answers");
                DiscoveryOutcome::Completed { count: self.count }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(ip: &str, uuid: &str) -> HostDescriptor {
        HostDescriptor {
            host_ip: Some(ip.to_string()),
            cpu_uuid: Some(uuid.to_string()),
            version: Some("1.3.0".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_self_answer_is_not_counted() {
        let mut registry = HostRegistry::new();
        let mut run = DiscoveryRun::new(1);

        let own = HostDescriptor {
            is_self: true,
            responded_from_ip: Some("10.0.0.1".to_string()),
            ..Default::default()
        };
        assert_eq!(run.ingest(&mut registry, &own), Ingested::OwnNode);

        assert_eq!(run.count(), 0);
        assert_eq!(registry.remote_count(), 0);
        assert!(registry.self_record().responded_from_ips.contains("10.0.0.1"));
    }

    #[test]
    fn test_identity_match_on_own_node_is_not_counted() {
        let mut registry = HostRegistry::new();
        registry.load_self(&remote("10.0.0.1", "u-self"));
        let mut run = DiscoveryRun::new(1);

        assert_eq!(
            run.ingest(&mut registry, &remote("192.168.1.1", "u-self")),
            Ingested::OwnNode
        );
        assert_eq!(run.count(), 0);
        assert!(registry.self_record().known_ips.contains("192.168.1.1"));
    }

    #[test]
    fn test_answer_without_identity_is_dropped() {
        let mut registry = HostRegistry::new();
        let mut run = DiscoveryRun::new(1);

        for _ in 0..2 {
            assert_eq!(
                run.ingest(&mut registry, &HostDescriptor::default()),
                Ingested::Ignored
            );
        }

        assert_eq!(run.count(), 0);
        assert_eq!(registry.remote_count(), 0);
        assert_eq!(
            run.finish(DiscoveryEnd::Interrupted("reset".into())),
            DiscoveryOutcome::Failed {
                message: "reset".into()
            }
        );
    }

    #[test]
    fn test_duplicate_answers_merge() {
        let mut registry = HostRegistry::new();
        let mut run = DiscoveryRun::new(1);

        let first = run.ingest(&mut registry, &remote("10.0.0.2", "u-2"));
        let second = run.ingest(&mut registry, &remote("192.168.1.2", "u-2"));

        let Ingested::Created(id) = first else {
            panic!("expected a new record, got {first:?}");
        };
        assert_eq!(second, Ingested::Merged(id));
        assert_eq!(registry.remote_count(), 1);
        assert_eq!(run.count(), 2);
    }

    #[test]
    fn test_outcomes() {
        let mut registry = HostRegistry::new();
        let mut run = DiscoveryRun::new(1);

        assert_eq!(
            run.finish(DiscoveryEnd::Interrupted("reset".into())),
            DiscoveryOutcome::Failed {
                message: "reset".into()
            }
        );

        run.ingest(&mut registry, &remote("10.0.0.2", "u-2"));
        assert_eq!(
            run.finish(DiscoveryEnd::Interrupted("reset".into())),
            DiscoveryOutcome::Completed { count: 1 }
        );
        assert_eq!(
            run.finish(DiscoveryEnd::Completed).into_event(),
            FleetEvent::DiscoveryCompleted { count: 1 }
        );
    }
}
