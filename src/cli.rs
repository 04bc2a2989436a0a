//! Terminal front end: line-based input, a printing presenter, and an
//! `$EDITOR`-backed detail view.

use anyhow::{Context, Result};
use clap::Parser;
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, Notify};

use crate::conditions::{ConditionField, FilterConditions};
use crate::config::Config;
use crate::db::SqliteRepository;
use crate::engine::SearchEngine;
use crate::prefs::FilePreferences;
use crate::session::{DetailView, Presenter, SearchSession, SessionEvent};
use crate::types::{DetailRequest, Note, SessionOutcome};

#[derive(Debug, Parser)]
#[command(name = "note-finder", about = "Incremental search over your notes")]
pub struct Cli {
    /// Notes database (overrides the config file)
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JSON array of notes to load into the database before searching
    #[arg(long)]
    pub import: Option<PathBuf>,
}

/// Notes currently on screen, shared with the input reader so `:open N` can resolve N.
pub type Shown = Arc<Mutex<Vec<Note>>>;

pub struct TerminalPresenter {
    shown: Shown,
}

impl TerminalPresenter {
    pub fn new(shown: Shown) -> Self {
        Self { shown }
    }

    fn replace_shown(&self, notes: &[Note]) {
        if let Ok(mut shown) = self.shown.lock() {
            *shown = notes.to_vec();
        }
    }
}

impl Presenter for TerminalPresenter {
    fn render(&mut self, notes: &[Note]) {
        self.replace_shown(notes);
        for (i, note) in notes.iter().enumerate() {
            println!("{}", format_row(i + 1, note));
        }
    }

    fn render_empty(&mut self) {
        self.replace_shown(&[]);
        println!("No matching notes.");
    }

    fn show_busy_indicator(&mut self, busy: bool) {
        if busy {
            println!("searching...");
        }
    }

    fn show_conditions(&mut self, conditions: FilterConditions) {
        println!("{}", format_conditions(conditions));
    }

    fn notify_failure(&mut self) {
        eprintln!("Search failed, try again.");
    }

    fn clear_input_focus(&mut self) {
        let _ = std::io::stdout().flush();
    }
}

fn format_conditions(conditions: FilterConditions) -> String {
    let mark = |on: bool| if on { "[x]" } else { "[ ]" };
    format!(
        "{} tags  {} archived  {} trashed",
        mark(conditions.include_tags),
        mark(conditions.include_archived),
        mark(conditions.include_trashed)
    )
}

fn format_row(position: usize, note: &Note) -> String {
    let mut row = format!("{position:>3}. {}", note.title);
    if !note.tags.is_empty() {
        row.push_str(&format!(" [{}]", note.tags.join(", ")));
    }
    if note.archived {
        row.push_str(" (archived)");
    }
    if note.trashed {
        row.push_str(" (trashed)");
    }
    row
}

/// Opens the note body in an editor and writes it back if it changed.
pub struct EditorDetailView {
    repository: SqliteRepository,
    editor: String,
    /// Signalled when the editor exits so the input reader resumes reading stdin.
    resume: Arc<Notify>,
}

impl EditorDetailView {
    pub fn new(repository: SqliteRepository, editor: String, resume: Arc<Notify>) -> Self {
        Self { repository, editor, resume }
    }
}

impl DetailView for EditorDetailView {
    fn view_note(&mut self, note: &Note, request: DetailRequest) -> impl Future<Output = bool> + Send {
        let repository = self.repository.clone();
        let editor = self.editor.clone();
        let resume = Arc::clone(&self.resume);
        let note = note.clone();
        async move {
            tracing::debug!(?request, id = %note.id, "Opening note in editor");
            let edited = tokio::task::spawn_blocking(move || edit_note(&repository, &editor, &note)).await;
            resume.notify_one();
            match edited {
                Ok(Ok(changed)) => changed,
                Ok(Err(e)) => {
                    tracing::warn!("Editing note failed: {e:#}");
                    false
                }
                Err(e) => {
                    tracing::warn!("Editor task failed: {e}");
                    false
                }
            }
        }
    }
}

fn edit_note(repository: &SqliteRepository, editor: &str, note: &Note) -> Result<bool> {
    let mut file = tempfile::Builder::new().suffix(".md").tempfile()?;
    file.write_all(note.body.as_bytes())?;
    file.flush()?;

    let mut parts = editor.split_whitespace();
    let program = parts.next().context("empty editor command")?;
    let status = std::process::Command::new(program)
        .args(parts)
        .arg(file.path())
        .status()
        .with_context(|| format!("failed to launch editor: {editor}"))?;
    if !status.success() {
        anyhow::bail!("editor exited with {status}");
    }

    let body = std::fs::read_to_string(file.path())?;
    if body == note.body {
        return Ok(false);
    }
    repository
        .update_body(&note.id, &body, now_ms())
        .context("failed to save edited note")
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// One line of terminal input.
#[derive(Debug, PartialEq)]
pub enum InputCommand {
    Event(SessionEvent),
    Help,
    Invalid(String),
}

/// Plain text is a submitted query; `:`-prefixed lines are commands.
pub fn parse_line(line: &str, shown: &[Note]) -> InputCommand {
    let line = line.trim_end_matches(['\r', '\n']);
    let Some(command) = line.strip_prefix(':') else {
        return InputCommand::Event(SessionEvent::TextSubmitted(line.to_string()));
    };

    let mut words = command.splitn(2, ' ');
    match (words.next().unwrap_or(""), words.next()) {
        ("tags", None) => InputCommand::Event(SessionEvent::Toggle(ConditionField::Tags)),
        ("archived", None) => InputCommand::Event(SessionEvent::Toggle(ConditionField::Archived)),
        ("trashed", None) => InputCommand::Event(SessionEvent::Toggle(ConditionField::Trashed)),
        ("type", text) => {
            InputCommand::Event(SessionEvent::TextChanged(text.unwrap_or("").to_string()))
        }
        ("open", Some(n)) => match n.trim().parse::<usize>() {
            Ok(i) if i >= 1 && i <= shown.len() => {
                InputCommand::Event(SessionEvent::OpenNote(shown[i - 1].clone()))
            }
            _ => InputCommand::Invalid(format!("no result numbered {}", n.trim())),
        },
        ("q" | "quit", None) => InputCommand::Event(SessionEvent::Close),
        ("help" | "h", None) => InputCommand::Help,
        _ => InputCommand::Invalid(format!("unknown command: {line}")),
    }
}

const HELP: &str = "Type a query and press enter. Commands:
  :type TEXT   search TEXT after the debounce delay
  :tags        toggle matching tag names
  :archived    toggle including archived notes
  :trashed     toggle including trashed notes
  :open N      edit result N
  :q           quit";

/// Read stdin line by line and forward events. Pauses after `:open` until the
/// editor has released the terminal.
async fn read_input(events: mpsc::Sender<SessionEvent>, shown: Shown, resume: Arc<Notify>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Failed to read input: {e}");
                break;
            }
        };
        let command = {
            let shown = shown.lock().map(|s| s.clone()).unwrap_or_default();
            parse_line(&line, &shown)
        };
        match command {
            InputCommand::Event(event) => {
                let opens_editor = matches!(event, SessionEvent::OpenNote(_));
                let closes = event == SessionEvent::Close;
                if events.send(event).await.is_err() || closes {
                    return;
                }
                if opens_editor {
                    resume.notified().await;
                }
            }
            InputCommand::Help => println!("{HELP}"),
            InputCommand::Invalid(message) => eprintln!("{message}"),
        }
    }
    let _ = events.send(SessionEvent::Close).await;
}

fn import_notes(repository: &SqliteRepository, path: &Path) -> Result<usize> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let notes: Vec<Note> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse notes from {}", path.display()))?;
    for note in &notes {
        repository.upsert(note)?;
    }
    Ok(notes.len())
}

/// Main entry point for the CLI application.
pub async fn run() -> Result<SessionOutcome> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db_path = config.db_path(cli.db.as_ref());
    let repository = SqliteRepository::open(&db_path)
        .with_context(|| format!("failed to open notes at {}", db_path.display()))?;
    if let Some(path) = &cli.import {
        let (repo, path) = (repository.clone(), path.clone());
        let count = tokio::task::spawn_blocking(move || import_notes(&repo, &path)).await??;
        println!("Imported {count} notes.");
    }

    let shown: Shown = Arc::new(Mutex::new(Vec::new()));
    let resume = Arc::new(Notify::new());

    let engine = SearchEngine::new(Arc::new(repository.clone()))
        .with_timeout(config.repository_timeout());
    let session = SearchSession::start(
        engine,
        FilePreferences::new(config.preferences_path()),
        TerminalPresenter::new(Arc::clone(&shown)),
        EditorDetailView::new(repository, config.editor(), Arc::clone(&resume)),
    )
    .with_debounce(config.debounce());

    println!("{}  (:help for commands)", format_conditions(session.conditions()));

    let (tx, rx) = mpsc::channel(64);
    tokio::spawn(read_input(tx, shown, resume));

    Ok(session.run(rx).await)
}
