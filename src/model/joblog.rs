// src/model/joblog.rs

//! Per-job processing log.
//!
//! Jobs append severity-leveled entries while running; the final log
//! travels with the [`JobResult`](crate::model::JobResult) so completion
//! consumers can inspect what happened. The log is bounded: when the entry
//! limit is exceeded, the severity floor ratchets down one level and all
//! entries below the new floor are dropped, so problems survive the
//! longest.

use std::time::{Instant, SystemTime};

/// Severity of a log entry. Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobLogLevel {
    Problem,
    Info,
    Detail,
}

/// One entry in a job's processing log.
#[derive(Debug, Clone)]
pub struct JobLogEntry {
    /// Milliseconds elapsed from log creation to this entry.
    pub elapsed_ms: u64,
    pub level: JobLogLevel,
    /// Name of the processing step active when the entry was added.
    pub process_step: String,
    pub message: String,
}

const DEFAULT_PROCESS_STEP: &str = ".";
const DEFAULT_LIMIT: usize = 1000;

/// Append-only, severity-leveled, bounded job log.
#[derive(Debug, Clone)]
pub struct JobLog {
    start_at: SystemTime,
    started: Instant,
    level: JobLogLevel,
    limit: usize,
    process_step: String,
    entries: Vec<JobLogEntry>,
    problem_count: usize,
}

impl Default for JobLog {
    fn default() -> Self {
        Self::new(JobLogLevel::Detail)
    }
}

impl JobLog {
    pub fn new(level: JobLogLevel) -> Self {
        Self::with_limit(level, DEFAULT_LIMIT)
    }

    pub fn with_limit(level: JobLogLevel, limit: usize) -> Self {
        Self {
            start_at: SystemTime::now(),
            started: Instant::now(),
            level,
            limit: limit.max(1),
            process_step: DEFAULT_PROCESS_STEP.to_string(),
            entries: Vec::new(),
            problem_count: 0,
        }
    }

    /// Creation time of the log.
    pub fn start_at(&self) -> SystemTime {
        self.start_at
    }

    /// Current detail level (may have been ratcheted down by the shrink
    /// policy).
    pub fn level(&self) -> JobLogLevel {
        self.level
    }

    pub fn has_problem(&self) -> bool {
        self.problem_count > 0
    }

    pub fn entries(&self) -> &[JobLogEntry] {
        &self.entries
    }

    /// Mark the start of a named processing step; subsequent entries carry
    /// the step name. An empty name resets to the default step.
    pub fn set_process_step(&mut self, step: impl Into<String>) {
        let step = step.into();
        self.process_step = if step.is_empty() {
            DEFAULT_PROCESS_STEP.to_string()
        } else {
            step
        };
    }

    /// Add a problem entry. Problems are always recorded regardless of the
    /// current level.
    pub fn problem(&mut self, message: impl Into<String>) {
        self.push(JobLogLevel::Problem, message.into());
        self.problem_count += 1;
    }

    /// Add an informational entry (discarded when the level floor is
    /// `Problem`).
    pub fn info(&mut self, message: impl Into<String>) {
        if self.level >= JobLogLevel::Info {
            self.push(JobLogLevel::Info, message.into());
        }
    }

    /// Add a detail entry (recorded only at `Detail` level).
    pub fn detail(&mut self, message: impl Into<String>) {
        if self.level >= JobLogLevel::Detail {
            self.push(JobLogLevel::Detail, message.into());
        }
    }

    fn push(&mut self, level: JobLogLevel, message: String) {
        self.entries.push(JobLogEntry {
            elapsed_ms: self.started.elapsed().as_millis() as u64,
            level,
            process_step: self.process_step.clone(),
            message,
        });
        // Shrink policy: ratchet the severity floor down and drop entries
        // below it until the log fits (or only problems remain).
        while self.entries.len() >= self.limit && self.level != JobLogLevel::Problem {
            self.level = match self.level {
                JobLogLevel::Detail => JobLogLevel::Info,
                _ => JobLogLevel::Problem,
            };
            let floor = self.level;
            self.entries.retain(|e| e.level <= floor);
        }
    }
}
