// src/runtime/job.rs

//! Runtime wrapper around a [`Job`] template, bound to one starter.
//!
//! Creating a `RuntimeJob` subscribes a handler with its starter; dropping
//! it unsubscribes. The handler spawns the actual work onto the tokio
//! runtime, so activation never blocks on job execution. Whatever happens
//! inside the job (error, panic, asynchronous continuation), exactly one
//! concrete result reaches the activation barrier.

use std::sync::{Arc, Weak};

use tracing::{debug, error, info};

use crate::master::MasterJob;
use crate::model::JobResult;
use crate::props::Props;
use crate::runtime::starter::{
    remove_job_handler_of, Activation, JobHandler, RuntimeStarter, StarterShared,
};

/// A configured job instance subscribed to one starter.
pub struct RuntimeJob {
    name: String,
    description: String,
    starter: Weak<StarterShared>,
    handler_id: u64,
}

impl RuntimeJob {
    /// Subscribe a job described by `master` to `starter`.
    ///
    /// `instance_props` override the template's properties; the
    /// activation's run properties override both at execution time.
    pub fn create(
        master: &Arc<MasterJob>,
        starter: &RuntimeStarter,
        name: impl Into<String>,
        description: impl Into<String>,
        instance_props: Props,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        let job_props = Props::overlaid(master.properties(), &instance_props);

        let handler: JobHandler = {
            let master = Arc::clone(master);
            let name = name.clone();
            let description = description.clone();
            Arc::new(move |activation: Activation, run_props: Props| {
                let merged = Props::overlaid(&job_props, &run_props);
                let master = Arc::clone(&master);
                let name = name.clone();
                let description = description.clone();
                tokio::spawn(async move {
                    info!(job = %name, "executing job");
                    let result = run_job_instance(master, &name, &description, merged).await;
                    if result.success {
                        info!(job = %name, "job finished: {}", result.message);
                    } else {
                        error!(job = %name, "job failed: {}", result.message);
                    }
                    activation.add_result(result);
                });
                true
            })
        };

        let handler_id = starter.add_job_handler(handler);
        debug!(job = %name, starter = %starter.name(), "job subscribed to starter");
        Self {
            name,
            description,
            starter: starter.shared_weak(),
            handler_id,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

impl Drop for RuntimeJob {
    fn drop(&mut self) {
        remove_job_handler_of(&self.starter, self.handler_id);
        debug!(job = %self.name, "job unsubscribed from starter");
    }
}

/// Construct, initialize and run one fresh job instance, absorbing every
/// failure mode into a [`JobResult`].
///
/// The job body runs on its own spawned task so a panic is caught as a
/// `JoinError` instead of tearing down the reporting path. Asynchronous
/// results are unwrapped here; the barrier only ever sees concrete ones.
async fn run_job_instance(
    master: Arc<MasterJob>,
    name: &str,
    description: &str,
    props: Props,
) -> JobResult {
    let task = {
        let name = name.to_string();
        let description = description.to_string();
        tokio::spawn(async move {
            let mut job = master.new_target();
            if let Err(err) = job.initialize(&name, &description, props.clone()) {
                let mut result = JobResult::from_error(&name, &format!("{err:#}"));
                if let Some(log) = job.processing_log() {
                    result = result.with_log(log);
                }
                return result;
            }
            match job.run(&props).await {
                Ok(mut result) => {
                    while let Some(fut) = result.take_async() {
                        result = fut.await;
                    }
                    if result.processing_log.is_none() {
                        result.processing_log = job.processing_log();
                    }
                    result
                }
                Err(err) => {
                    let mut result = JobResult::from_error(&name, &format!("{err:#}"));
                    if let Some(log) = job.processing_log() {
                        result = result.with_log(log);
                    }
                    result
                }
            }
        })
    };

    match task.await {
        Ok(result) => result,
        Err(err) => JobResult::from_error(name, &format!("job execution panicked: {err}")),
    }
}
