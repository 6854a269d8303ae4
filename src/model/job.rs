// src/model/job.rs

use async_trait::async_trait;

use crate::model::joblog::JobLog;
use crate::model::result::JobResult;
use crate::props::Props;

/// A unit of work executed in response to a starter activation.
///
/// The runtime constructs a **fresh** job instance from its registered
/// factory for every single activation, initializes it with the merged
/// template + run properties, runs it on a background task, and discards
/// it afterwards. Implementations therefore never see two activations.
///
/// Errors returned from `initialize` or `run` are converted into failure
/// [`JobResult`]s by the runtime; they never propagate into the starter.
#[async_trait]
pub trait Job: Send {
    /// Called once, before `run`, with the job's runtime name and the
    /// merged properties.
    fn initialize(&mut self, name: &str, description: &str, props: Props) -> anyhow::Result<()>;

    /// Execute the job. `run_props` are the activation's run properties
    /// (template job properties already merged in, run values winning).
    async fn run(&mut self, run_props: &Props) -> anyhow::Result<JobResult>;

    /// Snapshot of the job's processing log, attached to failure results
    /// by the runtime. Jobs without a log return `None`.
    fn processing_log(&self) -> Option<JobLog> {
        None
    }
}
