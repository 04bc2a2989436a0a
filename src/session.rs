//! Consumer-facing search controller.
//!
//! Binds text input and condition toggles to a [`SearchEngine`], forwards the
//! current query's results to a [`Presenter`], and remembers whether any note
//! was changed from a detail view so the caller can be told when the session ends.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::conditions::{ConditionField, FilterConditions};
use crate::config::DEFAULT_DEBOUNCE_MS;
use crate::engine::SearchEngine;
use crate::prefs::PreferencesStore;
use crate::repository::NoteRepository;
use crate::types::{
    DetailRequest, Note, QueryResult, QueryStatus, QueryTicket, SessionOutcome,
    NOTE_DETAIL_REQUEST,
};

/// Whatever draws the result list.
pub trait Presenter {
    fn render(&mut self, notes: &[Note]);
    fn render_empty(&mut self);
    fn show_busy_indicator(&mut self, busy: bool);
    /// Reflect the current toggle states, e.g. checked menu items.
    fn show_conditions(&mut self, conditions: FilterConditions);
    /// Generic transient notice that the last search failed.
    fn notify_failure(&mut self);
    /// Dismiss the keyboard or whatever input affordance has focus.
    fn clear_input_focus(&mut self);
}

/// Screen that shows a single note and may edit it.
pub trait DetailView {
    /// Resolves to true if the note was changed.
    fn view_note(
        &mut self,
        note: &Note,
        request: DetailRequest,
    ) -> impl Future<Output = bool> + Send;
}

/// Input driving [`SearchSession::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    TextChanged(String),
    TextSubmitted(String),
    Toggle(ConditionField),
    OpenNote(Note),
    Close,
}

pub struct SearchSession<R, P, V, D>
where
    R: NoteRepository,
    P: PreferencesStore,
    V: Presenter,
    D: DetailView,
{
    engine: SearchEngine<R>,
    results: mpsc::UnboundedReceiver<QueryResult>,
    conditions: FilterConditions,
    query_text: String,
    content_changed: bool,
    preferences: P,
    presenter: V,
    detail: D,
    debounce: Duration,
}

impl<R, P, V, D> SearchSession<R, P, V, D>
where
    R: NoteRepository,
    P: PreferencesStore,
    V: Presenter,
    D: DetailView,
{
    /// Load the persisted conditions (default if absent or unreadable) and
    /// start listening to the engine.
    pub fn start(mut engine: SearchEngine<R>, preferences: P, presenter: V, detail: D) -> Self {
        let results = engine.subscribe();
        let conditions = preferences
            .load_filter_conditions()
            .map(|s| FilterConditions::deserialize(&s))
            .unwrap_or_default();
        tracing::debug!(?conditions, "Search session started");

        Self {
            engine,
            results,
            conditions,
            query_text: String::new(),
            content_changed: false,
            preferences,
            presenter,
            detail,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
        }
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn conditions(&self) -> FilterConditions {
        self.conditions
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn content_changed(&self) -> bool {
        self.content_changed
    }

    pub fn presenter(&self) -> &V {
        &self.presenter
    }

    pub fn on_query_text_change(&mut self, text: &str) -> QueryTicket {
        self.query_text = text.to_owned();
        self.engine.query(text, self.conditions)
    }

    pub fn on_query_text_submit(&mut self, text: &str) -> QueryTicket {
        let ticket = self.on_query_text_change(text);
        self.presenter.clear_input_focus();
        ticket
    }

    /// Flip one condition, persist it, and search the current text again.
    pub fn toggle_condition(&mut self, field: ConditionField) -> QueryTicket {
        self.conditions.toggle(field);
        self.presenter.show_conditions(self.conditions);
        if let Err(e) = self.preferences.save_filter_conditions(&self.conditions.serialize()) {
            tracing::warn!("Failed to persist search conditions: {e:#}");
        }
        self.engine.refresh(&self.query_text, self.conditions)
    }

    /// Show a note in the detail view and refresh the results once it closes.
    pub async fn open_note(&mut self, note: &Note) -> QueryTicket {
        let changed = self.detail.view_note(note, NOTE_DETAIL_REQUEST).await;
        self.on_detail_result(changed)
    }

    /// The detail view came back; results may be stale either way.
    pub fn on_detail_result(&mut self, changed: bool) -> QueryTicket {
        if changed {
            self.content_changed = true;
        }
        self.engine.refresh(&self.query_text, self.conditions)
    }

    /// Apply one result to the presenter. Returns false if it was stale.
    pub fn deliver(&mut self, result: QueryResult) -> bool {
        if !self.engine.is_current(result.sequence_id) {
            tracing::trace!(sequence_id = result.sequence_id, "Discarding stale result");
            return false;
        }

        self.presenter.show_busy_indicator(!result.is_settled());
        match result.status {
            QueryStatus::Pending => {}
            QueryStatus::Success => match result.notes {
                Some(notes) if !notes.is_empty() => self.presenter.render(&notes),
                _ => self.presenter.render_empty(),
            },
            QueryStatus::Failed => self.presenter.notify_failure(),
        }
        true
    }

    /// Wait for the next result and deliver it.
    /// Returns None only if the result channel has closed, which a live session's
    /// engine never does; callers waiting for quiet should bound this with a timeout.
    pub async fn pump(&mut self) -> Option<bool> {
        let result = self.results.recv().await?;
        Some(self.deliver(result))
    }

    /// Deliver everything already queued without waiting.
    pub fn drain_ready(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(result) = self.results.try_recv() {
            if self.deliver(result) {
                delivered += 1;
            }
        }
        delivered
    }

    /// End the session. Anything still in flight is dropped.
    pub fn finish(mut self) -> SessionOutcome {
        self.engine.shutdown();
        let outcome = if self.content_changed {
            SessionOutcome::Committed { changed: true }
        } else {
            SessionOutcome::Dismissed
        };
        tracing::debug!(?outcome, "Search session finished");
        outcome
    }

    /// Drive the session from an event stream until `Close` or the sender is dropped.
    ///
    /// Typed text is debounced; the latest text wins. Any other event searches a
    /// pending debounced text first so it acts on what the user sees.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> SessionOutcome {
        let mut pending_text: Option<String> = None;
        let debounce = tokio::time::sleep(self.debounce);
        tokio::pin!(debounce);

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::TextChanged(text)) => {
                        pending_text = Some(text);
                        debounce.as_mut().reset(Instant::now() + self.debounce);
                    }
                    Some(SessionEvent::TextSubmitted(text)) => {
                        pending_text = None;
                        self.on_query_text_submit(&text);
                    }
                    Some(SessionEvent::Toggle(field)) => {
                        self.flush_pending(&mut pending_text);
                        self.toggle_condition(field);
                    }
                    Some(SessionEvent::OpenNote(note)) => {
                        self.flush_pending(&mut pending_text);
                        self.open_note(&note).await;
                    }
                    Some(SessionEvent::Close) | None => break,
                },
                () = &mut debounce, if pending_text.is_some() => {
                    self.flush_pending(&mut pending_text);
                }
                Some(result) = self.results.recv() => {
                    self.deliver(result);
                }
            }
        }

        self.finish()
    }

    fn flush_pending(&mut self, pending_text: &mut Option<String>) {
        if let Some(text) = pending_text.take() {
            self.on_query_text_change(&text);
        }
    }
}
