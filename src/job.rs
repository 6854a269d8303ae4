// src/job.rs

//! Built-in job implementations.
//!
//! Most jobs are application code registered by the embedding host; the
//! one shipped here logs its run properties and echoes them back as
//! result objects, which is enough to exercise a configuration end to
//! end (chains see the echoed properties as predecessor results).

use async_trait::async_trait;
use tracing::info;

use crate::master::JobRegistry;
use crate::model::{Job, JobLog, JobResult};
use crate::props::Props;

/// Type key for the log-run job.
pub const LOG_RUN_TYPE_KEY: &str = "log-run";

/// Logs the activation's run properties and returns them as result
/// objects.
#[derive(Debug, Default)]
pub struct LogRun {
    name: String,
    log: JobLog,
}

impl LogRun {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Job for LogRun {
    fn initialize(&mut self, name: &str, _description: &str, _props: Props) -> anyhow::Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    async fn run(&mut self, run_props: &Props) -> anyhow::Result<JobResult> {
        self.log.set_process_step("log");
        for (key, value) in run_props.iter() {
            info!(job = %self.name, key, ?value, "run property");
            self.log.detail(format!("{key} = {value:?}"));
        }
        self.log.info(format!("{} properties logged", run_props.len()));
        Ok(JobResult::success_with(&self.name, run_props.clone()).with_log(self.log.clone()))
    }

    fn processing_log(&self) -> Option<JobLog> {
        Some(self.log.clone())
    }
}

/// Registry populated with every built-in job type.
pub fn builtin_jobs() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register(LOG_RUN_TYPE_KEY, || Box::new(LogRun::new()));
    registry
}
