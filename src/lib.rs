pub mod cli;
pub mod conditions;
pub mod config;
pub mod db;
pub mod engine;
pub mod prefs;
pub mod repository;
pub mod session;
pub mod types;

pub use conditions::{ConditionField, FilterConditions};
pub use engine::SearchEngine;
pub use repository::{NoteRepository, RepositoryError};
pub use session::{DetailView, Presenter, SearchSession, SessionEvent};
pub use types::{
    DetailRequest, Note, QueryResult, QueryStatus, QueryTicket, SearchQuery, SessionOutcome,
    NOTE_DETAIL_REQUEST,
};

/// Install the global tracing subscriber.
pub fn init_tracing() {
    // Only log WARN and above in production to avoid leaking note content
    #[cfg(debug_assertions)]
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    #[cfg(not(debug_assertions))]
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(tracing::Level::WARN)
        .init();
}
