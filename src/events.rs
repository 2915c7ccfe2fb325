//! Domain events emitted after successful mutations.
//!
//! The core emits exactly one event per successful mutating step and never
//! waits on delivery. Ordering and delivery guarantees belong to the sink.

use std::io::Write;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

use crate::review::Verdict;
use crate::types::{ActorId, BranchName, CommitId, MergeRequestId, RepositoryId};

/// Something that happened in the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    RepositoryCreated {
        repository_id: RepositoryId,
    },
    CommitCreated {
        repository_id: RepositoryId,
        commit_id: CommitId,
        parent_ids: Vec<CommitId>,
        author_id: ActorId,
    },
    BranchCreated {
        repository_id: RepositoryId,
        branch: BranchName,
        head: CommitId,
    },
    BranchAdvanced {
        repository_id: RepositoryId,
        branch: BranchName,
        previous_head: CommitId,
        new_head: CommitId,
    },
    BranchDeleted {
        repository_id: RepositoryId,
        branch: BranchName,
    },
    MergeRequestOpened {
        repository_id: RepositoryId,
        merge_request_id: MergeRequestId,
        source_branch: BranchName,
        target_branch: BranchName,
    },
    ReviewUpdated {
        repository_id: RepositoryId,
        merge_request_id: MergeRequestId,
        reviewer_id: ActorId,
        verdict: Verdict,
    },
    MergeRequestMerged {
        repository_id: RepositoryId,
        merge_request_id: MergeRequestId,
        merge_commit_id: CommitId,
    },
    MergeRequestClosed {
        repository_id: RepositoryId,
        merge_request_id: MergeRequestId,
    },
}

impl DomainEvent {
    /// stable snake_case name, matching the serialized `event` tag
    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::RepositoryCreated { .. } => "repository_created",
            DomainEvent::CommitCreated { .. } => "commit_created",
            DomainEvent::BranchCreated { .. } => "branch_created",
            DomainEvent::BranchAdvanced { .. } => "branch_advanced",
            DomainEvent::BranchDeleted { .. } => "branch_deleted",
            DomainEvent::MergeRequestOpened { .. } => "merge_request_opened",
            DomainEvent::ReviewUpdated { .. } => "review_updated",
            DomainEvent::MergeRequestMerged { .. } => "merge_request_merged",
            DomainEvent::MergeRequestClosed { .. } => "merge_request_closed",
        }
    }

    pub fn repository_id(&self) -> &RepositoryId {
        match self {
            DomainEvent::RepositoryCreated { repository_id }
            | DomainEvent::CommitCreated { repository_id, .. }
            | DomainEvent::BranchCreated { repository_id, .. }
            | DomainEvent::BranchAdvanced { repository_id, .. }
            | DomainEvent::BranchDeleted { repository_id, .. }
            | DomainEvent::MergeRequestOpened { repository_id, .. }
            | DomainEvent::ReviewUpdated { repository_id, .. }
            | DomainEvent::MergeRequestMerged { repository_id, .. }
            | DomainEvent::MergeRequestClosed { repository_id, .. } => repository_id,
        }
    }
}

/// Receiver of domain events (notification dispatch lives behind this).
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DomainEvent);
}

/// Drops every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _event: DomainEvent) {}
}

/// Records events in memory, in emission order.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// copy of everything recorded so far
    pub fn snapshot(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    /// take everything recorded so far, leaving the log empty
    pub fn drain(&self) -> Vec<DomainEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// names of the recorded events, handy in assertions
    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(DomainEvent::name).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl EventSink for EventLog {
    fn emit(&self, event: DomainEvent) {
        self.events.lock().push(event);
    }
}

/// Writes one structured log line per event.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: DomainEvent) {
        info!(
            event = event.name(),
            repository = %event.repository_id(),
            detail = ?event,
            "domain event"
        );
    }
}

/// Serializes each event as one JSON document per line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: DomainEvent) {
        let mut writer = self.writer.lock();
        if let Err(e) = write_line(&mut *writer, &event) {
            warn!(event = event.name(), error = %e, "failed to write domain event");
        }
    }
}

fn write_line<W: Write>(writer: &mut W, event: &DomainEvent) -> std::io::Result<()> {
    serde_json::to_writer(&mut *writer, event)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
