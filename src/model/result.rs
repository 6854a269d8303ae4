// src/model/result.rs

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::SystemTime;

use crate::model::joblog::JobLog;
use crate::props::Props;

/// Result-object key under which a job's error is reported when its
/// execution (or result construction) failed.
pub const JOB_ERROR_KEY: &str = "$Job-Error";

/// Continuation of an asynchronous job result.
///
/// A [`JobResult`] may itself be "asynchronous": it wraps a future that
/// resolves to another result. Consumers unwrap recursively until a
/// concrete result is reached; the runtime job does this before reporting
/// to the barrier, so completions only ever carry concrete results.
pub type AsyncJobResult = Pin<Box<dyn Future<Output = JobResult> + Send + 'static>>;

/// Result of one job run.
///
/// Barrier identity is the case-insensitive job name: a job reporting
/// twice within one activation overwrites its earlier result, it is never
/// counted twice.
pub struct JobResult {
    pub job_name: String,
    pub end_at: SystemTime,
    pub success: bool,
    pub message: String,
    /// Arbitrary result objects for downstream consumers (chained
    /// starters merge these into their run properties).
    pub result_objects: Props,
    pub processing_log: Option<JobLog>,
    // Mutex keeps the non-Sync future out of the auto-trait picture;
    // completions holding results stay shareable across tasks.
    async_result: Mutex<Option<AsyncJobResult>>,
}

impl JobResult {
    fn base(job_name: impl Into<String>, success: bool, message: String) -> Self {
        Self {
            job_name: job_name.into(),
            end_at: SystemTime::now(),
            success,
            message,
            result_objects: Props::new(),
            processing_log: None,
            async_result: Mutex::new(None),
        }
    }

    /// Successful result with the default status message.
    pub fn success(job_name: impl Into<String>) -> Self {
        Self::base(job_name, true, "Completed successfully.".to_string())
    }

    /// Successful result carrying result objects.
    pub fn success_with(job_name: impl Into<String>, result_objects: Props) -> Self {
        let mut res = Self::success(job_name);
        res.result_objects = result_objects;
        res
    }

    /// Failure with a status message.
    pub fn failure(job_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::base(job_name, false, message.into())
    }

    /// Failure derived from an error; the error text becomes the message
    /// and is also stored under [`JOB_ERROR_KEY`] in the result objects.
    pub fn from_error(job_name: impl Into<String>, err: &dyn fmt::Display) -> Self {
        let text = format!("{err}");
        let mut res = Self::base(job_name, false, text.clone());
        res.result_objects.set(JOB_ERROR_KEY, text);
        res
    }

    /// Asynchronous result: the concrete outcome is produced by `fut`.
    pub fn deferred(
        job_name: impl Into<String>,
        fut: impl Future<Output = JobResult> + Send + 'static,
    ) -> Self {
        let res = Self::base(job_name, false, "pending".to_string());
        *res.async_result.lock().expect("lock poisoned") = Some(Box::pin(fut));
        res
    }

    /// Attach the job's processing log.
    pub fn with_log(mut self, log: JobLog) -> Self {
        self.processing_log = Some(log);
        self
    }

    /// Override the status message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_async(&self) -> bool {
        self.async_result.lock().expect("lock poisoned").is_some()
    }

    /// Take the async continuation, if any, for unwrapping.
    pub fn take_async(&self) -> Option<AsyncJobResult> {
        self.async_result.lock().expect("lock poisoned").take()
    }
}

impl fmt::Debug for JobResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobResult")
            .field("job_name", &self.job_name)
            .field("success", &self.success)
            .field("message", &self.message)
            .field("result_objects", &self.result_objects)
            .field("async", &self.is_async())
            .finish()
    }
}

/// Immutable outcome of one activation cycle of a starter.
///
/// Holds exactly one (final, concrete) result per job that was subscribed
/// to the starter when the activation's barrier was created.
#[derive(Debug)]
pub struct StarterCompletion {
    pub starter_name: String,
    /// Barrier creation time of the activation cycle.
    pub time: SystemTime,
    /// Run properties the jobs were invoked with.
    pub run_props: Props,
    pub job_results: Vec<JobResult>,
}

impl StarterCompletion {
    /// Synthetic completion with no results (e.g. a request that activated
    /// nothing).
    pub fn empty(starter_name: impl Into<String>, run_props: Props) -> Self {
        Self {
            starter_name: starter_name.into(),
            time: SystemTime::now(),
            run_props,
            job_results: Vec::new(),
        }
    }

    pub fn successes(&self) -> impl Iterator<Item = &JobResult> {
        self.job_results.iter().filter(|r| r.success)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.job_results.iter().filter(|r| !r.success)
    }
}

impl fmt::Display for StarterCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "starter-compl[{}]:", self.starter_name)?;
        for (i, res) in self.job_results.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            let status = if res.success { "OK" } else { "ERROR" };
            write!(f, "{sep}{}[{status}]", res.job_name)?;
        }
        Ok(())
    }
}
