//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `sidenote_core` wiring.
//! - Keep output deterministic for quick local sanity checks.

use sidenote_core::{core_version, default_log_level, init_logging, Session, SessionConfig, SessionError};

#[tokio::main]
async fn main() {
    let log_dir = std::env::temp_dir().join("sidenote-logs");
    if let Err(err) = init_logging(default_log_level(), &log_dir.to_string_lossy()) {
        eprintln!("logging disabled: {err}");
    }

    if let Err(err) = run().await {
        eprintln!("sidenote smoke failed: {err}");
        std::process::exit(1);
    }
}

/// Drives one in-memory create/edit/flush cycle through the core.
async fn run() -> Result<(), SessionError> {
    let session = Session::start(SessionConfig::default()).await?;

    let note = session.store().create_note();
    session.editor().select_note(note.id).await;
    session.editor().edit_title("smoke");
    session.editor().edit_content("probe");
    session.editor().flush_pending().await;

    let notes = session.store().notes();
    let active_title = session
        .store()
        .active_note_id()
        .and_then(|id| session.store().note(id))
        .map(|note| note.title)
        .unwrap_or_default();

    println!("sidenote_core version={}", core_version());
    println!("notes={} active_title={active_title}", notes.len());

    session.shutdown().await;
    Ok(())
}
