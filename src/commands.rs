// src/commands.rs
use crate::api::{ApiError, VideoLibrary};
use crate::config::ConfigError;
use crate::edit::EditRequest;
use crate::editor::{Editor, EditorError, TaskTicket};
use crate::playback::CutMark;
use crate::tasks::PollOutcome;
use crate::validator::ValidationError;
use log::info;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const USAGE: &str = "usage: cutdesk <command> [--wait]

commands:
  health                              check that the API answers
  videos                              list originals and proxies
  upload <file>                       upload a video and queue its proxy
  status <task_id>                    show a task's status (--wait follows it)
  cut <filename> <start> <end>        queue a cut of an original
  concat <output> <path>...           queue a concatenation of stored files
  timeline <plan.json>                submit the clips listed in a plan
  download <name> <dest> [--original] save a proxy (or original) locally

--wait keeps polling a queued task until it finishes.";

// --- COMMANDS ---

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    Health,
    Videos,
    Upload {
        path: PathBuf,
        wait: bool,
    },
    Status {
        task_id: String,
        wait: bool,
    },
    Cut {
        filename: String,
        start: f64,
        end: f64,
        wait: bool,
    },
    Concat {
        output: String,
        paths: Vec<String>,
        wait: bool,
    },
    Timeline {
        plan: PathBuf,
        wait: bool,
    },
    Download {
        name: String,
        dest: PathBuf,
        original: bool,
    },
}

/// One entry of a timeline plan file: `[{ "video": "a.mp4", "start": 1, "end": 4 }]`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct PlanClip {
    pub video: String,
    pub start: f64,
    pub end: f64,
}

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("{0}")]
    Usage(String),
    #[error("invalid number for {arg}: '{value}'")]
    InvalidNumber { arg: &'static str, value: String },
    #[error("failed to read plan {path}: {source}")]
    PlanRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid plan {path}: {source}")]
    PlanParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

fn parse_seconds(arg: &'static str, value: &str) -> Result<f64, CommandError> {
    match value.parse::<f64>() {
        Ok(seconds) if seconds.is_finite() => Ok(seconds),
        _ => Err(CommandError::InvalidNumber {
            arg,
            value: value.to_string(),
        }),
    }
}

pub fn parse_args(args: &[String]) -> Result<Command, CommandError> {
    let wait = args.iter().any(|a| a == "--wait");
    let original = args.iter().any(|a| a == "--original");
    let positional: Vec<&str> = args
        .iter()
        .map(String::as_str)
        .filter(|a| !a.starts_with("--"))
        .collect();

    let Some((&name, rest)) = positional.split_first() else {
        return Ok(Command::Help);
    };

    match (name, rest) {
        ("help", _) => Ok(Command::Help),
        ("health", []) => Ok(Command::Health),
        ("videos", []) => Ok(Command::Videos),
        ("upload", [path]) => Ok(Command::Upload {
            path: PathBuf::from(*path),
            wait,
        }),
        ("status", [task_id]) => Ok(Command::Status {
            task_id: task_id.to_string(),
            wait,
        }),
        ("cut", [filename, start, end]) => Ok(Command::Cut {
            filename: filename.to_string(),
            start: parse_seconds("start", start)?,
            end: parse_seconds("end", end)?,
            wait,
        }),
        ("concat", [output, paths @ ..]) if !paths.is_empty() => Ok(Command::Concat {
            output: output.to_string(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            wait,
        }),
        ("timeline", [plan]) => Ok(Command::Timeline {
            plan: PathBuf::from(*plan),
            wait,
        }),
        ("download", [name, dest]) => Ok(Command::Download {
            name: name.to_string(),
            dest: PathBuf::from(*dest),
            original,
        }),
        (other, _) => Err(CommandError::Usage(format!(
            "unknown or malformed command '{}'",
            other
        ))),
    }
}

pub fn read_plan(path: &Path) -> Result<Vec<PlanClip>, CommandError> {
    let content = std::fs::read_to_string(path).map_err(|source| CommandError::PlanRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CommandError::PlanParse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn format_library(library: &VideoLibrary) -> String {
    let mut out = String::from("originals:");
    for name in &library.originals {
        out.push_str(&format!("\n  {}", name));
    }
    out.push_str("\nproxies:");
    for name in &library.proxies {
        out.push_str(&format!("\n  {}", name));
    }
    out
}

pub fn describe_outcome(task_id: &str, outcome: Option<PollOutcome>) -> String {
    match outcome {
        Some(PollOutcome::Finished(status)) => format!("{}: {}", task_id, status),
        Some(PollOutcome::Stopped(reason)) => {
            format!("{}: polling stopped ({})", task_id, reason)
        }
        None => format!("{}: polling cancelled", task_id),
    }
}

async fn finish(editor: &Editor, ticket: TaskTicket, wait: bool) -> String {
    let TaskTicket { task_id, poll } = ticket;
    if !wait {
        return format!("queued task {}", task_id);
    }
    let mut text = describe_outcome(&task_id, poll.finished().await);
    if let Some(result) = editor.task(&task_id).and_then(|record| record.result) {
        text.push_str(&format!("\n{}", result));
    }
    text
}

/// Runs one command against the session and returns what to print.
pub async fn execute(editor: &Editor, command: Command) -> Result<String, CommandError> {
    match command {
        Command::Help => Ok(USAGE.to_string()),
        Command::Health => Ok(editor.health_check().await?),
        Command::Videos => {
            let library = editor.fetch_videos().await?;
            Ok(format_library(&library))
        }
        Command::Upload { path, wait } => {
            let ticket = editor.upload_path(&path).await?;
            Ok(finish(editor, ticket, wait).await)
        }
        Command::Status { task_id, wait } => {
            if wait {
                let poll = editor.track_task(&task_id).await;
                Ok(describe_outcome(&task_id, poll.finished().await))
            } else {
                let status = editor.check_status(&task_id).await?;
                Ok(format!("{}: {}", task_id, status))
            }
        }
        Command::Cut {
            filename,
            start,
            end,
            wait,
        } => {
            let ticket = editor
                .submit_edit(EditRequest::cut(filename, start, end))
                .await?;
            Ok(finish(editor, ticket, wait).await)
        }
        Command::Concat {
            output,
            paths,
            wait,
        } => {
            let ticket = editor.submit_edit(EditRequest::concat(output, paths)).await?;
            Ok(finish(editor, ticket, wait).await)
        }
        Command::Timeline { plan, wait } => {
            let clips = read_plan(&plan)?;
            info!("[Commands] Building timeline of {} clips", clips.len());
            for clip in &clips {
                let load = editor.load_video(&clip.video);
                editor
                    .wait_until_ready(load)
                    .await
                    .map_err(EditorError::from)?;
                editor.set_cut_mark(CutMark::new(clip.start, clip.end));
                editor.add_to_timeline()?;
            }
            match editor.process_timeline().await? {
                Some(ticket) => Ok(finish(editor, ticket, wait).await),
                None => Ok("timeline is empty, nothing submitted".to_string()),
            }
        }
        Command::Download {
            name,
            dest,
            original,
        } => {
            let bytes = if original {
                editor.download_original(&name, &dest).await?
            } else {
                editor.download_proxy(&name, &dest).await?
            };
            Ok(format!("saved {} bytes to {}", bytes, dest.display()))
        }
    }
}
