// src/persist.rs

//! Completion persistence.
//!
//! The runtime can hand every [`StarterCompletion`] to a persister; the
//! built-in one appends JSON lines to a file. Persistence is off the
//! activation path (the runtime calls it fire-and-forget from a blocking
//! task), so a slow disk never delays the next activation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::debug;

use crate::model::{JobResult, StarterCompletion};
use crate::props::Props;

/// Sink for starter completions.
pub trait CompletionPersister: Send + Sync {
    fn store_completion(&self, completion: &StarterCompletion) -> Result<()>;
}

/// Hook notified (with the starter name) after a completion was written.
pub type PersistedHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Serialize)]
struct ResultRecord<'a> {
    job: &'a str,
    success: bool,
    message: &'a str,
    result_objects: &'a Props,
}

#[derive(Serialize)]
struct CompletionRecord<'a> {
    starter: &'a str,
    /// Barrier creation time, unix milliseconds.
    time_ms: u64,
    run_props: &'a Props,
    results: Vec<ResultRecord<'a>>,
}

impl<'a> CompletionRecord<'a> {
    fn from_completion(completion: &'a StarterCompletion) -> Self {
        Self {
            starter: &completion.starter_name,
            time_ms: completion
                .time
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            run_props: &completion.run_props,
            results: completion
                .job_results
                .iter()
                .map(|r: &JobResult| ResultRecord {
                    job: &r.job_name,
                    success: r.success,
                    message: &r.message,
                    result_objects: &r.result_objects,
                })
                .collect(),
        }
    }
}

/// Appends one JSON object per completion to a file.
pub struct JsonCompletionPersister {
    path: PathBuf,
    hooks: Mutex<Vec<PersistedHook>>,
}

impl JsonCompletionPersister {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            hooks: Mutex::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Register a hook fired after each successful write.
    pub fn on_persisted(&self, hook: PersistedHook) {
        self.hooks.lock().expect("lock poisoned").push(hook);
    }
}

impl CompletionPersister for JsonCompletionPersister {
    fn store_completion(&self, completion: &StarterCompletion) -> Result<()> {
        let record = CompletionRecord::from_completion(completion);
        let line = serde_json::to_string(&record).context("serializing completion record")?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("opening completion log {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("writing completion log {}", self.path.display()))?;
        debug!(starter = %completion.starter_name, path = %self.path.display(), "completion persisted");

        let hooks: Vec<PersistedHook> = self.hooks.lock().expect("lock poisoned").clone();
        for hook in hooks {
            hook(&completion.starter_name);
        }
        Ok(())
    }
}
