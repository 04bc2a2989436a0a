//! Fakes for the session's collaborators.

#![allow(dead_code)]

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;

use note_finder::prefs::PreferencesStore;
use note_finder::{
    DetailRequest, DetailView, FilterConditions, Note, NoteRepository, Presenter,
    RepositoryError, SearchSession,
};

pub type Reply = Result<Vec<Note>, RepositoryError>;

pub fn note(id: &str) -> Note {
    Note {
        id: id.to_string(),
        title: format!("Note {id}"),
        body: format!("body {id}"),
        tags: Vec::new(),
        archived: false,
        trashed: false,
        updated_time: 0,
    }
}

pub fn notes(ids: &[&str]) -> Vec<Note> {
    ids.iter().map(|id| note(id)).collect()
}

pub fn ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

// ===========================================
// Repositories
// ===========================================

/// Every call parks until the test resolves it by query text.
#[derive(Default)]
pub struct GatedRepository {
    calls: Mutex<Vec<(String, FilterConditions)>>,
    gates: Mutex<Vec<(String, oneshot::Sender<Reply>)>>,
}

impl GatedRepository {
    pub fn calls(&self) -> Vec<(String, FilterConditions)> {
        self.calls.lock().unwrap().clone()
    }

    /// Let spawned lookups run until `n` calls have reached the repository.
    pub async fn wait_for_calls(&self, n: usize) {
        for _ in 0..10_000 {
            if self.calls.lock().unwrap().len() >= n {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("expected {n} repository calls, saw {:?}", self.calls());
    }

    /// Settle the oldest parked call for `text`.
    pub fn resolve(&self, text: &str, reply: Reply) {
        let mut gates = self.gates.lock().unwrap();
        let pos = gates
            .iter()
            .position(|(t, _)| t == text)
            .unwrap_or_else(|| panic!("no pending call for {text:?}"));
        let (_, tx) = gates.remove(pos);
        let _ = tx.send(reply);
    }
}

impl NoteRepository for GatedRepository {
    fn search(
        &self,
        text: &str,
        conditions: FilterConditions,
    ) -> impl Future<Output = Reply> + Send {
        let (tx, rx) = oneshot::channel();
        self.calls.lock().unwrap().push((text.to_string(), conditions));
        self.gates.lock().unwrap().push((text.to_string(), tx));
        // A dropped gate stands in for a backend that never answered.
        async move { rx.await.unwrap_or(Err(RepositoryError::EmptyResponse)) }
    }
}

/// Answers at once with a single note whose id is the query text.
#[derive(Default)]
pub struct CannedRepository {
    calls: Mutex<Vec<(String, FilterConditions)>>,
}

impl CannedRepository {
    pub fn calls(&self) -> Vec<(String, FilterConditions)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn texts(&self) -> Vec<String> {
        self.calls().into_iter().map(|(text, _)| text).collect()
    }
}

impl NoteRepository for CannedRepository {
    fn search(
        &self,
        text: &str,
        conditions: FilterConditions,
    ) -> impl Future<Output = Reply> + Send {
        self.calls.lock().unwrap().push((text.to_string(), conditions));
        let found = vec![note(text)];
        async move { Ok::<_, RepositoryError>(found) }
    }
}

// ===========================================
// Preferences
// ===========================================

#[derive(Default)]
struct PrefsState {
    stored: Option<String>,
    saves: Vec<String>,
    fail_saves: bool,
}

/// In-memory store; clones share state so tests can inspect it after handing one to a session.
#[derive(Clone, Default)]
pub struct MemoryPreferences {
    state: Arc<Mutex<PrefsState>>,
}

impl MemoryPreferences {
    pub fn with_stored(serialized: &str) -> Self {
        let prefs = Self::default();
        prefs.state.lock().unwrap().stored = Some(serialized.to_string());
        prefs
    }

    pub fn failing() -> Self {
        let prefs = Self::default();
        prefs.state.lock().unwrap().fail_saves = true;
        prefs
    }

    pub fn saves(&self) -> Vec<String> {
        self.state.lock().unwrap().saves.clone()
    }
}

impl PreferencesStore for MemoryPreferences {
    fn load_filter_conditions(&self) -> Option<String> {
        self.state.lock().unwrap().stored.clone()
    }

    fn save_filter_conditions(&mut self, serialized: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_saves {
            anyhow::bail!("disk full");
        }
        state.stored = Some(serialized.to_string());
        state.saves.push(serialized.to_string());
        Ok(())
    }
}

// ===========================================
// Presenter and detail view
// ===========================================

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Render(Vec<String>),
    RenderEmpty,
    Busy(bool),
    Failure,
    ClearFocus,
}

/// Condition updates are kept apart from `events` so result sequences stay easy to assert.
#[derive(Clone, Default)]
pub struct RecordingPresenter {
    events: Arc<Mutex<Vec<ViewEvent>>>,
    conditions: Arc<Mutex<Vec<FilterConditions>>>,
}

impl RecordingPresenter {
    pub fn events(&self) -> Vec<ViewEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn renders(&self) -> Vec<ViewEvent> {
        self.events()
            .into_iter()
            .filter(|e| matches!(e, ViewEvent::Render(_) | ViewEvent::RenderEmpty))
            .collect()
    }

    pub fn conditions_shown(&self) -> Vec<FilterConditions> {
        self.conditions.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<ViewEvent> {
        self.events.lock().unwrap().last().cloned()
    }

    fn push(&self, event: ViewEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl Presenter for RecordingPresenter {
    fn render(&mut self, notes: &[Note]) {
        self.push(ViewEvent::Render(notes.iter().map(|n| n.id.clone()).collect()));
    }

    fn render_empty(&mut self) {
        self.push(ViewEvent::RenderEmpty);
    }

    fn show_busy_indicator(&mut self, busy: bool) {
        self.push(ViewEvent::Busy(busy));
    }

    fn show_conditions(&mut self, conditions: FilterConditions) {
        self.conditions.lock().unwrap().push(conditions);
    }

    fn notify_failure(&mut self) {
        self.push(ViewEvent::Failure);
    }

    fn clear_input_focus(&mut self) {
        self.push(ViewEvent::ClearFocus);
    }
}

/// Reports a fixed `changed` answer and remembers what it was asked to show.
#[derive(Clone, Default)]
pub struct ScriptedDetailView {
    pub changed: bool,
    opened: Arc<Mutex<Vec<(String, DetailRequest)>>>,
}

impl ScriptedDetailView {
    pub fn changing() -> Self {
        Self { changed: true, ..Self::default() }
    }

    pub fn opened(&self) -> Vec<(String, DetailRequest)> {
        self.opened.lock().unwrap().clone()
    }
}

impl DetailView for ScriptedDetailView {
    fn view_note(
        &mut self,
        note: &Note,
        request: DetailRequest,
    ) -> impl Future<Output = bool> + Send {
        self.opened.lock().unwrap().push((note.id.clone(), request));
        let changed = self.changed;
        async move { changed }
    }
}

// ===========================================
// Session helpers
// ===========================================

/// Deliver results until nothing arrives for a while. Returns how many were applied.
pub async fn settle<R, P, V, D>(session: &mut SearchSession<R, P, V, D>) -> usize
where
    R: NoteRepository,
    P: PreferencesStore,
    V: Presenter,
    D: DetailView,
{
    let mut applied = 0;
    loop {
        match tokio::time::timeout(Duration::from_millis(50), session.pump()).await {
            Ok(Some(true)) => applied += 1,
            Ok(Some(false)) => {}
            Ok(None) | Err(_) => return applied,
        }
    }
}
