use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;

use jobcntrl::config::JobCntrlConfigurator;
use jobcntrl::master::JobRegistry;
use jobcntrl::model::{Job, JobResult, StarterCompletion, JOB_ERROR_KEY};
use jobcntrl::props::Props;
use jobcntrl::runtime::{JobCntrlRuntime, PROP_PARALLEL_START};
use jobcntrl::starter::{builtin_starters, message::MessageBroker};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

/// Job producing one fixed result object, configured via properties.
struct EmitJob {
    name: String,
    props: Props,
}

#[async_trait]
impl Job for EmitJob {
    fn initialize(&mut self, name: &str, _description: &str, props: Props) -> anyhow::Result<()> {
        self.name = name.to_string();
        self.props = props;
        Ok(())
    }

    async fn run(&mut self, _run_props: &Props) -> anyhow::Result<JobResult> {
        let mut objects = Props::new();
        objects.set(
            self.props.get_str("Emit-Key", "emitted").to_string(),
            self.props.get_str("Emit-Value", "yes").to_string(),
        );
        Ok(JobResult::success_with(&self.name, objects))
    }
}

/// Job that always errors out of `run`.
struct BoomJob;

#[async_trait]
impl Job for BoomJob {
    fn initialize(&mut self, _name: &str, _description: &str, _props: Props) -> anyhow::Result<()> {
        Ok(())
    }

    async fn run(&mut self, _run_props: &Props) -> anyhow::Result<JobResult> {
        Err(anyhow::anyhow!("boom"))
    }
}

/// Job that blocks until a semaphore permit arrives.
struct BlockJob {
    name: String,
    gate: Arc<Semaphore>,
}

#[async_trait]
impl Job for BlockJob {
    fn initialize(&mut self, name: &str, _description: &str, _props: Props) -> anyhow::Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    async fn run(&mut self, _run_props: &Props) -> anyhow::Result<JobResult> {
        self.gate.acquire().await?.forget();
        Ok(JobResult::success(&self.name))
    }
}

fn test_jobs(gate: Arc<Semaphore>) -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register("emit", || {
        Box::new(EmitJob {
            name: String::new(),
            props: Props::new(),
        })
    });
    registry.register("boom", || Box::new(BoomJob));
    registry.register("block", move || {
        Box::new(BlockJob {
            name: String::new(),
            gate: Arc::clone(&gate),
        })
    });
    registry
}

fn started_runtime(
    cfg: jobcntrl::config::JobCntrlCfg,
    jobs: JobRegistry,
) -> Result<JobCntrlRuntime, Box<dyn Error>> {
    let broker = Arc::new(MessageBroker::new());
    let mut runtime = JobCntrlRuntime::new(builtin_starters(&broker), jobs);
    runtime.init(cfg)?;
    runtime.start()?;
    Ok(runtime)
}

fn completions_of(
    runtime: &JobCntrlRuntime,
    starter: &str,
) -> mpsc::UnboundedReceiver<Arc<StarterCompletion>> {
    let (tx, rx) = mpsc::unbounded_channel();
    runtime
        .starters()
        .get(starter)
        .expect("starter exists")
        .on_completion(Arc::new(move |completion: &Arc<StarterCompletion>| {
            let _ = tx.send(Arc::clone(completion));
        }));
    rx
}

#[tokio::test]
async fn completion_carries_one_result_per_job() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("good", "emit", "", Props::new())
        .master_job("bad", "boom", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("a", "good", "kick", "", Props::new())
        .job("b", "bad", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::new(Semaphore::new(0))))?;
    let mut completions = completions_of(&runtime, "kick");

    assert!(runtime.activate("kick", Props::new())?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    assert_eq!(completion.starter_name, "kick");
    assert_eq!(completion.job_results.len(), 2);
    assert_eq!(completion.successes().count(), 1);
    assert_eq!(completion.failures().count(), 1);

    let failed = completion.failures().next().expect("failed result");
    assert_eq!(failed.job_name, "b");
    assert!(failed.message.contains("boom"));
    assert!(failed.result_objects.contains_key(JOB_ERROR_KEY));

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn second_activation_is_rejected_while_one_is_open() -> TestResult {
    let gate = Arc::new(Semaphore::new(0));
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("blocker", "block", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("slow", "blocker", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::clone(&gate)))?;
    let mut completions = completions_of(&runtime, "kick");

    assert!(runtime.activate("kick", Props::new())?);
    assert!(!runtime.activate("kick", Props::new())?);

    gate.add_permits(1);
    timeout(WAIT, completions.recv()).await?.expect("completion");

    // The cycle is closed, the guard opens again.
    assert!(runtime.activate("kick", Props::new())?);
    gate.add_permits(1);
    timeout(WAIT, completions.recv()).await?.expect("completion");

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn parallel_start_bypasses_the_guard() -> TestResult {
    let gate = Arc::new(Semaphore::new(0));
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("blocker", "block", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("slow", "blocker", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::clone(&gate)))?;
    let mut completions = completions_of(&runtime, "kick");

    assert!(runtime.activate("kick", Props::new())?);
    let parallel = Props::new().with(PROP_PARALLEL_START, true);
    assert!(runtime.activate("kick", parallel)?);

    gate.add_permits(2);
    timeout(WAIT, completions.recv()).await?.expect("first completion");
    timeout(WAIT, completions.recv()).await?.expect("second completion");

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn activation_without_jobs_reports_nothing_started() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .starter("lonely", "man", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::new(Semaphore::new(0))))?;

    assert!(!runtime.activate("lonely", Props::new())?);

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn disabled_starter_ignores_activations() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("good", "emit", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("a", "good", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::new(Semaphore::new(0))))?;

    runtime.starters().get("kick").expect("starter").set_enabled(false)?;
    assert!(!runtime.activate("kick", Props::new())?);

    runtime.starters().get("kick").expect("starter").set_enabled(true)?;
    assert!(runtime.activate("kick", Props::new())?);

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn template_run_props_are_copied_into_the_activation() -> TestResult {
    let starter_props = Props::new().with("RUN-PROP-Region", "eu").with("Unrelated", 1);
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("good", "emit", "", Props::new())
        .starter("kick", "man", "", starter_props)
        .job("a", "good", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::new(Semaphore::new(0))))?;
    let mut completions = completions_of(&runtime, "kick");

    assert!(runtime.activate("kick", Props::new())?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    assert_eq!(completion.run_props.get_str("Region", ""), "eu");
    assert!(!completion.run_props.contains_key("Unrelated"));
    assert!(!completion.run_props.contains_key("RUN-PROP-Region"));

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn monitor_veto_cancels_the_activation() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("good", "emit", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("a", "good", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, test_jobs(Arc::new(Semaphore::new(0))))?;
    let mut completions = completions_of(&runtime, "kick");

    runtime
        .starters()
        .get("kick")
        .expect("starter")
        .set_activation_monitor(Some(Arc::new(|_starter: &str, props: &Props| {
            props.get_bool("Allowed", false)
        })));

    assert!(!runtime.activate("kick", Props::new())?);
    assert!(timeout(QUIET, completions.recv()).await.is_err());

    assert!(runtime.activate("kick", Props::new().with("Allowed", true))?);
    timeout(WAIT, completions.recv()).await?.expect("completion");

    runtime.stop().await;
    Ok(())
}

/// Job answering with a deferred result; the barrier must only ever see
/// the concrete one.
struct DeferredJob {
    name: String,
}

#[async_trait]
impl Job for DeferredJob {
    fn initialize(&mut self, name: &str, _description: &str, _props: Props) -> anyhow::Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    async fn run(&mut self, _run_props: &Props) -> anyhow::Result<JobResult> {
        let name = self.name.clone();
        Ok(JobResult::deferred(&self.name, async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            JobResult::success(&name).with_message("resolved later")
        }))
    }
}

#[tokio::test]
async fn deferred_results_resolve_before_the_barrier() -> TestResult {
    let mut jobs = JobRegistry::new();
    jobs.register("deferred", || {
        Box::new(DeferredJob {
            name: String::new(),
        })
    });
    let cfg = JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_job("later", "deferred", "", Props::new())
        .starter("kick", "man", "", Props::new())
        .job("a", "later", "kick", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg, jobs)?;
    let mut completions = completions_of(&runtime, "kick");

    assert!(runtime.activate("kick", Props::new())?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    let result = &completion.job_results[0];
    assert!(result.success);
    assert!(!result.is_async());
    assert_eq!(result.message, "resolved later");

    runtime.stop().await;
    Ok(())
}
