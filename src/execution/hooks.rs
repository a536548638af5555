//! Execution hooks
//!
//! Observability/persistence callbacks. The engine notifies a hook when a
//! trigger fires and when a run with an execution id completes; nothing a
//! hook returns affects control flow.
//!
//! Completion records written by [`StateFileHook`] land in
//! `{dir}/{execution_id}.json`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EngineError, StepError};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
}

/// Sent when a trigger node fires.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TriggerNotice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub node_id: String,
    pub node_name: String,
    pub trigger_data: Value,
}

/// Outcome of a finished run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRecord {
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub status: ExecutionStatus,
    /// Data of the last recorded node result
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Error of the first failed node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CompletionRecord {
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HookEvent {
    Trigger(TriggerNotice),
    Complete(CompletionRecord),
}

/// Receiver of execution events.
pub trait ExecutionHook: Send + Sync {
    fn notify(&self, event: HookEvent) -> BoxFuture<'_, Result<(), StepError>>;
}

/// Logs every event. Used when no other hook is configured.
pub struct LoggingHook;

impl ExecutionHook for LoggingHook {
    fn notify(&self, event: HookEvent) -> BoxFuture<'_, Result<(), StepError>> {
        Box::pin(async move {
            match event {
                HookEvent::Trigger(notice) => {
                    info!("Trigger '{}' fired", notice.node_name);
                }
                HookEvent::Complete(record) => {
                    info!(
                        "Execution {} finished: {:?} in {}ms",
                        record.execution_id,
                        record.status,
                        record.duration_ms()
                    );
                }
            }
            Ok(())
        })
    }
}

/// Persists completion records as pretty-printed JSON files.
pub struct StateFileHook {
    dir: PathBuf,
}

impl StateFileHook {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a record for `execution_id` is stored in.
    pub fn record_path(&self, execution_id: &str) -> PathBuf {
        let stem: String = execution_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{}.json", stem))
    }

    /// Writes a record, creating the directory if needed.
    pub async fn save(&self, record: &CompletionRecord) -> Result<PathBuf, EngineError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| EngineError::Hook(format!("{}: {}", self.dir.display(), e)))?;

        let path = self.record_path(&record.execution_id);
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| EngineError::Hook(e.to_string()))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| EngineError::Hook(format!("{}: {}", path.display(), e)))?;

        info!("Saved execution record to {}", path.display());
        Ok(path)
    }

    /// Reads the record of an earlier run.
    pub async fn load(&self, execution_id: &str) -> Result<CompletionRecord, EngineError> {
        let path = self.record_path(execution_id);
        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| EngineError::Hook(format!("{}: {}", path.display(), e)))?;
        let record = serde_json::from_str(&content).map_err(|e| EngineError::Hook(e.to_string()))?;

        debug!("Loaded execution record from {}", path.display());
        Ok(record)
    }

    /// Deletes a stored record. Missing files are not an error.
    pub async fn delete(&self, execution_id: &str) -> Result<(), EngineError> {
        let path = self.record_path(execution_id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(EngineError::Hook(format!("{}: {}", path.display(), e))),
        }
    }
}

impl ExecutionHook for StateFileHook {
    fn notify(&self, event: HookEvent) -> BoxFuture<'_, Result<(), StepError>> {
        Box::pin(async move {
            match event {
                HookEvent::Trigger(notice) => {
                    debug!("Trigger '{}' fired", notice.node_id);
                    Ok(())
                }
                HookEvent::Complete(record) => match self.save(&record).await {
                    Ok(_) => Ok(()),
                    Err(e) => {
                        warn!("Could not persist execution {}: {}", record.execution_id, e);
                        Err(e.into())
                    }
                },
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;
    use tempfile::tempdir;

    fn record(id: &str) -> CompletionRecord {
        let start = Utc::now();
        CompletionRecord {
            execution_id: id.to_string(),
            workflow_id: Some("wf".to_string()),
            status: ExecutionStatus::Error,
            output: Some(json!({ "n": 1 })),
            error: Some("boom".to_string()),
            start_time: start,
            end_time: start + Duration::milliseconds(250),
        }
    }

    #[test]
    fn test_record_serialization() {
        let value = serde_json::to_value(record("e1")).unwrap();
        assert_eq!(value["executionId"], json!("e1"));
        assert_eq!(value["status"], json!("error"));
        assert!(value.get("startTime").is_some());
    }

    #[test]
    fn test_duration() {
        assert_eq!(record("e").duration_ms(), 250);
    }

    #[test]
    fn test_record_path_is_sanitized() {
        let hook = StateFileHook::new("/tmp/records");
        assert_eq!(
            hook.record_path("run/1:a"),
            PathBuf::from("/tmp/records/run_1_a.json")
        );
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let hook = StateFileHook::new(dir.path().join("nested"));
        let original = record("exec-42");

        let path = hook.save(&original).await.unwrap();
        assert!(path.exists());

        let loaded = hook.load("exec-42").await.unwrap();
        assert_eq!(loaded, original);

        hook.delete("exec-42").await.unwrap();
        assert!(!path.exists());
        hook.delete("exec-42").await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_complete_writes_file() {
        let dir = tempdir().unwrap();
        let hook = StateFileHook::new(dir.path());

        hook.notify(HookEvent::Complete(record("e7"))).await.unwrap();
        assert!(dir.path().join("e7.json").exists());
    }

    #[tokio::test]
    async fn test_load_missing_fails() {
        let dir = tempdir().unwrap();
        let hook = StateFileHook::new(dir.path());
        assert!(matches!(hook.load("nope").await, Err(EngineError::Hook(_))));
    }

    #[tokio::test]
    async fn test_logging_hook_accepts_events() {
        LoggingHook
            .notify(HookEvent::Complete(record("e")))
            .await
            .unwrap();
    }
}
