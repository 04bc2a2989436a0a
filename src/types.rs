use serde::{Deserialize, Serialize};

use crate::conditions::FilterConditions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub archived: bool,
    pub trashed: bool,
    pub updated_time: i64, // Unix timestamp in ms
}

/// A query as issued by the engine. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub text: String,
    /// Snapshot of the conditions at issue time.
    pub conditions: FilterConditions,
    pub sequence_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Pending,
    Success,
    Failed,
}

/// Status-tagged envelope handed to observers for every dispatched or settled query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResult {
    pub status: QueryStatus,
    pub notes: Option<Vec<Note>>,
    pub sequence_id: u64,
}

impl QueryResult {
    pub fn pending(sequence_id: u64) -> Self {
        Self { status: QueryStatus::Pending, notes: None, sequence_id }
    }

    pub fn success(sequence_id: u64, notes: Vec<Note>) -> Self {
        Self { status: QueryStatus::Success, notes: Some(notes), sequence_id }
    }

    pub fn failed(sequence_id: u64) -> Self {
        Self { status: QueryStatus::Failed, notes: None, sequence_id }
    }

    /// True once the lookup has settled one way or the other.
    pub fn is_settled(&self) -> bool {
        self.status != QueryStatus::Pending
    }
}

/// What `SearchEngine::query` did with a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryTicket {
    /// A repository lookup was spawned under this sequence id.
    Dispatched(u64),
    /// Empty text: an empty Success was emitted without touching the repository.
    Immediate(u64),
    /// Same text and conditions as the last issued query; nothing happened.
    Unchanged,
    /// The engine has been shut down.
    Closed,
}

/// Opaque marker passed to the detail view so the caller can tell launches apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailRequest(pub u32);

/// Request marker used when a search result is opened.
pub const NOTE_DETAIL_REQUEST: DetailRequest = DetailRequest(20004);

/// Signal returned to whoever launched the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionOutcome {
    Committed { changed: bool },
    Dismissed,
}
