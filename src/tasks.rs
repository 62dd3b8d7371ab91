// src/tasks.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

/// Worker task state as reported by `/task-status/{id}`. Unknown states are
/// kept verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Retry,
    Started,
    Success,
    Failure,
    Revoked,
    Other(String),
}

impl TaskStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "PENDING",
            Self::Retry => "RETRY",
            Self::Started => "STARTED",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Revoked => "REVOKED",
            Self::Other(s) => s,
        }
    }

    /// Still worth polling.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Retry | Self::Started)
    }

    pub fn is_success(&self) -> bool {
        *self == Self::Success
    }
}

impl From<String> for TaskStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "PENDING" => Self::Pending,
            "RETRY" => Self::Retry,
            "STARTED" => Self::Started,
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "REVOKED" => Self::Revoked,
            _ => Self::Other(s),
        }
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Upload,
    Timeline,
    Edit,
    /// Tracked by id only, e.g. a task started in another session.
    Unknown,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TaskRecord {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub filename: String,
    pub result: Option<Value>,
    /// Set when the poll chain stopped on a request error.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, kind: TaskKind, filename: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id: task_id.into(),
            kind,
            status: TaskStatus::Pending,
            filename: filename.into(),
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, status: TaskStatus, result: Option<Value>) {
        self.status = status;
        if result.is_some() {
            self.result = result;
        }
        self.error = None;
        self.updated_at = Utc::now();
    }

    pub fn fail_request(&mut self, message: String) {
        self.error = Some(message);
        self.updated_at = Utc::now();
    }
}

// --- POLL CHAINS ---

#[derive(Clone, Debug, PartialEq)]
pub enum PollOutcome {
    /// The task reached a terminal status.
    Finished(TaskStatus),
    /// A status request failed; the chain gave up.
    Stopped(String),
}

/// Caller side of one poll chain.
#[derive(Debug)]
pub struct PollHandle {
    task_id: String,
    join: JoinHandle<PollOutcome>,
}

impl PollHandle {
    pub fn new(task_id: impl Into<String>, join: JoinHandle<PollOutcome>) -> Self {
        Self {
            task_id: task_id.into(),
            join,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn cancel(&self) {
        self.join.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the chain to end. `None` when it was cancelled.
    pub async fn finished(self) -> Option<PollOutcome> {
        self.join.await.ok()
    }
}

/// Every running poll chain, keyed by task id, so teardown can stop them.
#[derive(Clone, Default)]
pub struct ActivePolls(Arc<Mutex<HashMap<String, AbortHandle>>>);

impl ActivePolls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a chain. A chain already running for the same task is aborted.
    pub async fn track(&self, task_id: &str, handle: AbortHandle) {
        let mut map = self.0.lock().await;
        map.retain(|_, h| !h.is_finished());
        if let Some(previous) = map.insert(task_id.to_string(), handle) {
            previous.abort();
        }
    }

    /// Returns true when a running chain was stopped.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let mut map = self.0.lock().await;
        match map.remove(task_id) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false, // Already finished or didn't exist
        }
    }

    pub async fn cancel_all(&self) -> usize {
        let mut map = self.0.lock().await;
        let running = map.values().filter(|h| !h.is_finished()).count();
        for (_, handle) in map.drain() {
            handle.abort();
        }
        running
    }

    pub async fn is_polling(&self, task_id: &str) -> bool {
        let map = self.0.lock().await;
        map.get(task_id).is_some_and(|h| !h.is_finished())
    }

    pub async fn active_count(&self) -> usize {
        let map = self.0.lock().await;
        map.values().filter(|h| !h.is_finished()).count()
    }
}
