// src/lib.rs

pub mod api;
pub mod commands;
pub mod config;
pub mod edit;
pub mod editor;
pub mod playback;
pub mod tasks;
pub mod timeline;
pub mod validator;


pub use api::{ApiError, HttpApi, VideoApi, VideoLibrary};
pub use config::{ClientConfig, ConfigManager, CutMarkPolicy};
pub use editor::{Editor, EditorError, Key};
pub use playback::{format_time, MediaElement};

use commands::{execute, parse_args, Command, CommandError, USAGE};

/// Entry point of the `cutdesk` binary: parses `args`, runs the command
/// against the configured API and returns what to print.
pub async fn run(args: Vec<String>) -> Result<String, CommandError> {
    let command = parse_args(&args)?;
    if command == Command::Help {
        return Ok(USAGE.to_string());
    }

    let prefs = ConfigManager::load()?;
    let editor = Editor::connect(prefs.config().clone())?;

    let result = execute(&editor, command).await;

    // Poll chains of tasks queued without --wait die with the session.
    editor.shutdown().await;
    result
}
