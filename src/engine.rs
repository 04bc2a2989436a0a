//! Query dispatch and staleness resolution.
//!
//! Every issued query takes the next sequence id. Lookups are never cancelled
//! when superseded; a settled lookup is only broadcast if its id is still the
//! current one, so an older query that settles late is dropped silently.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::conditions::FilterConditions;
use crate::config::DEFAULT_REPOSITORY_TIMEOUT_MS;
use crate::repository::{NoteRepository, RepositoryError};
use crate::types::{Note, QueryResult, QueryStatus, QueryTicket, SearchQuery};

/// Shared between the engine and its in-flight lookups.
#[derive(Clone, Default)]
struct SequenceGate {
    current: Arc<AtomicU64>,
    /// Last id that settled Failed; a repeat of it must reach the repository again.
    failed: Arc<AtomicU64>,
    closed: Arc<AtomicBool>,
}

impl SequenceGate {
    fn next(&self) -> u64 {
        self.current.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current(&self) -> u64 {
        self.current.load(Ordering::SeqCst)
    }

    fn is_current(&self, sequence_id: u64) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.current() == sequence_id
    }

    /// Bump past every issued id so nothing pending can match again.
    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.current.fetch_add(1, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_failed(&self, sequence_id: u64) {
        self.failed.store(sequence_id, Ordering::SeqCst);
    }

    fn current_failed(&self) -> bool {
        let current = self.current();
        current != 0 && self.failed.load(Ordering::SeqCst) == current
    }
}

pub struct SearchEngine<R: NoteRepository> {
    repository: Arc<R>,
    gate: SequenceGate,
    last_issued: Option<(String, FilterConditions)>,
    observers: Vec<mpsc::UnboundedSender<QueryResult>>,
    timeout: Duration,
}

impl<R: NoteRepository> SearchEngine<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            gate: SequenceGate::default(),
            last_issued: None,
            observers: Vec::new(),
            timeout: Duration::from_millis(DEFAULT_REPOSITORY_TIMEOUT_MS),
        }
    }

    /// Lookups running longer than this settle as Failed.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Register an observer. It receives every result emitted from now on.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<QueryResult> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(tx);
        rx
    }

    /// Highest sequence id issued so far (0 before the first query).
    pub fn current_sequence(&self) -> u64 {
        self.gate.current()
    }

    /// True if a result with this id may still be shown.
    pub fn is_current(&self, sequence_id: u64) -> bool {
        self.gate.is_current(sequence_id)
    }

    /// Issue a query unless it repeats the last one exactly.
    /// A repeat of a query that settled Failed is a retry and goes through.
    /// Never blocks; the outcome arrives on the subscribed channels.
    pub fn query(&mut self, text: &str, conditions: FilterConditions) -> QueryTicket {
        if let Some((last_text, last_conditions)) = &self.last_issued {
            if last_text == text
                && *last_conditions == conditions
                && !self.gate.is_closed()
                && !self.gate.current_failed()
            {
                tracing::trace!("Skipping duplicate query");
                return QueryTicket::Unchanged;
            }
        }
        self.refresh(text, conditions)
    }

    /// Issue a query even if it repeats the last one.
    pub fn refresh(&mut self, text: &str, conditions: FilterConditions) -> QueryTicket {
        if self.gate.is_closed() {
            tracing::debug!("Query ignored, engine is shut down");
            return QueryTicket::Closed;
        }
        self.observers.retain(|tx| !tx.is_closed());

        let query = SearchQuery {
            text: text.to_owned(),
            conditions,
            sequence_id: self.gate.next(),
        };
        self.last_issued = Some((query.text.clone(), conditions));

        if query.text.is_empty() {
            // Still takes an id so anything in flight goes stale.
            broadcast(&self.observers, QueryResult::success(query.sequence_id, Vec::new()));
            return QueryTicket::Immediate(query.sequence_id);
        }

        let sequence_id = query.sequence_id;
        tracing::debug!(sequence_id, len = query.text.len(), ?conditions, "Dispatching search");
        broadcast(&self.observers, QueryResult::pending(sequence_id));

        let repository = Arc::clone(&self.repository);
        let gate = self.gate.clone();
        let observers = self.observers.clone();
        let timeout = self.timeout;
        tokio::spawn(async move {
            let result = match lookup(repository, &query, timeout).await {
                Ok(notes) => QueryResult::success(sequence_id, notes),
                Err(e) => {
                    tracing::warn!(sequence_id, "Search failed: {e}");
                    QueryResult::failed(sequence_id)
                }
            };
            if gate.is_current(sequence_id) {
                if result.status == QueryStatus::Failed {
                    gate.mark_failed(sequence_id);
                }
                broadcast(&observers, result);
            } else {
                tracing::trace!(sequence_id, "Dropping stale result");
            }
        });

        QueryTicket::Dispatched(sequence_id)
    }

    /// Invalidate every pending query. Results that settle afterwards are dropped,
    /// and further `query` calls do nothing.
    pub fn shutdown(&mut self) {
        self.gate.close();
        self.observers.clear();
    }
}

/// Run the repository call on its own task so a panic or a timeout surfaces
/// as an error instead of a result that never arrives.
async fn lookup<R: NoteRepository>(
    repository: Arc<R>,
    query: &SearchQuery,
    timeout: Duration,
) -> Result<Vec<Note>, RepositoryError> {
    let text = query.text.clone();
    let conditions = query.conditions;
    let mut call = tokio::spawn(async move { repository.search(&text, conditions).await });

    match tokio::time::timeout(timeout, &mut call).await {
        Ok(joined) => joined?,
        Err(_) => {
            call.abort();
            Err(RepositoryError::Timeout(timeout))
        }
    }
}

fn broadcast(observers: &[mpsc::UnboundedSender<QueryResult>], result: QueryResult) {
    for tx in observers {
        // A closed observer is pruned on the next query.
        let _ = tx.send(result.clone());
    }
}
