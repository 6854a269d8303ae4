use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use jobcntrl::config::{validate_config, JobCntrlCfg, JobCntrlConfigurator};
use jobcntrl::master::JobRegistry;
use jobcntrl::model::{Job, JobResult, StarterCompletion};
use jobcntrl::props::{PropValue, Props};
use jobcntrl::runtime::JobCntrlRuntime;
use jobcntrl::starter::chained::{
    PROP_ACTIVATE_ON_PREV_STATUS, PROP_COMPLETED_STARTER, PROP_PREV_ALLOW_FAIL,
    RPROP_PREVIOUS_RESULTS, RPROP_STARTER_COMPLETION,
};
use jobcntrl::starter::{builtin_starters, message::MessageBroker};

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(2);
const QUIET: Duration = Duration::from_millis(300);

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

fn test_jobs() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register("emit", || {
        Box::new(EmitJob {
            name: String::new(),
            props: Props::new(),
        })
    });
    registry.register("boom", || Box::new(BoomJob));
    registry
}

/// first (manual) -> second (chained); the chained starter runs one emit
/// job so its own cycle completes too.
fn chain_cfg(second_props: Props) -> JobCntrlCfg {
    JobCntrlConfigurator::new()
        .master_starter("man", "manual", "", Props::new())
        .master_starter("next", "chained", "", Props::new())
        .master_job("emitter", "emit", "", Props::new())
        .master_job("bomb", "boom", "", Props::new())
        .starter("first", "man", "", Props::new())
        .starter(
            "second",
            "next",
            "",
            second_props.with(PROP_COMPLETED_STARTER, "first"),
        )
        .job("final", "emitter", "second", "", Props::new())
        .into_cfg()
}

fn started_runtime(cfg: JobCntrlCfg) -> Result<JobCntrlRuntime, Box<dyn Error>> {
    let broker = Arc::new(MessageBroker::new());
    let mut runtime = JobCntrlRuntime::new(builtin_starters(&broker), test_jobs());
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
async fn successful_predecessor_cascades_with_merged_results() -> TestResult {
    let mut cfg = chain_cfg(Props::new());
    cfg.job.insert(
        "a".into(),
        jobcntrl::config::JobCfg {
            master: "emitter".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new().with("Emit-Key", "Report").with("Emit-Value", "done"),
        },
    );
    cfg.job.insert(
        "b".into(),
        jobcntrl::config::JobCfg {
            master: "emitter".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new().with("Emit-Key", "Count").with("Emit-Value", "2"),
        },
    );
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "second");

    assert!(runtime.activate("first", Props::new().with("Origin", "test"))?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    // Chained run props inherit the predecessor's.
    assert_eq!(completion.run_props.get_str("Origin", ""), "test");

    let previous = completion
        .run_props
        .get(RPROP_PREVIOUS_RESULTS)
        .and_then(PropValue::as_map)
        .expect("previous results map");
    assert_eq!(previous.get_str("Report", ""), "done");
    assert_eq!(previous.get_str("Count", ""), "2");

    let predecessor = completion
        .run_props
        .get(RPROP_STARTER_COMPLETION)
        .and_then(PropValue::downcast_obj::<StarterCompletion>)
        .expect("predecessor completion object");
    assert_eq!(predecessor.starter_name, "first");
    assert_eq!(predecessor.successes().count(), 2);

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn predecessor_failure_blocks_the_success_chain() -> TestResult {
    let mut cfg = chain_cfg(Props::new());
    cfg.job.insert(
        "a".into(),
        jobcntrl::config::JobCfg {
            master: "bomb".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new(),
        },
    );
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "second");

    assert!(runtime.activate("first", Props::new())?);
    assert!(timeout(QUIET, completions.recv()).await.is_err());

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn allow_fail_lets_a_partly_failed_predecessor_cascade() -> TestResult {
    let mut cfg = chain_cfg(Props::new().with(PROP_PREV_ALLOW_FAIL, true));
    cfg.job.insert(
        "a".into(),
        jobcntrl::config::JobCfg {
            master: "emitter".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new().with("Emit-Key", "Report").with("Emit-Value", "done"),
        },
    );
    cfg.job.insert(
        "b".into(),
        jobcntrl::config::JobCfg {
            master: "bomb".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new(),
        },
    );
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "second");

    assert!(runtime.activate("first", Props::new())?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    // Only the successful job's objects are merged.
    let previous = completion
        .run_props
        .get(RPROP_PREVIOUS_RESULTS)
        .and_then(PropValue::as_map)
        .expect("previous results map");
    assert_eq!(previous.get_str("Report", ""), "done");

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn failure_chain_activates_only_on_failures() -> TestResult {
    let mut cfg = chain_cfg(Props::new().with(PROP_ACTIVATE_ON_PREV_STATUS, "Failure"));
    cfg.job.insert(
        "a".into(),
        jobcntrl::config::JobCfg {
            master: "emitter".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new(),
        },
    );
    cfg.job.insert(
        "b".into(),
        jobcntrl::config::JobCfg {
            master: "bomb".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new(),
        },
    );
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "second");

    assert!(runtime.activate("first", Props::new())?);
    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");

    let previous = completion
        .run_props
        .get(RPROP_PREVIOUS_RESULTS)
        .and_then(PropValue::as_map)
        .expect("previous results map");
    let entry = previous.get("b").and_then(PropValue::as_map).expect("entry for failed job");
    assert!(!entry.get_bool("Success", true));
    assert!(entry.get_str("Message", "").contains("boom"));
    assert!(!previous.contains_key("a"));

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn failure_chain_stays_quiet_on_success() -> TestResult {
    let mut cfg = chain_cfg(Props::new().with(PROP_ACTIVATE_ON_PREV_STATUS, "Failure"));
    cfg.job.insert(
        "a".into(),
        jobcntrl::config::JobCfg {
            master: "emitter".into(),
            starter: "first".into(),
            description: String::new(),
            properties: Props::new(),
        },
    );
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "second");

    assert!(runtime.activate("first", Props::new())?);
    assert!(timeout(QUIET, completions.recv()).await.is_err());

    runtime.stop().await;
    Ok(())
}

#[test]
fn chained_starter_without_predecessor_fails_validation() {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("next", "chained", "", Props::new())
        .starter("second", "next", "", Props::new())
        .into_cfg();
    let err = validate_config(&cfg).expect_err("validation must fail");
    assert!(err.to_string().contains(PROP_COMPLETED_STARTER));
}

#[test]
fn chain_cycles_fail_validation() {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("next", "chained", "", Props::new())
        .starter(
            "a",
            "next",
            "",
            Props::new().with(PROP_COMPLETED_STARTER, "b"),
        )
        .starter(
            "b",
            "next",
            "",
            Props::new().with(PROP_COMPLETED_STARTER, "a"),
        )
        .into_cfg();
    let err = validate_config(&cfg).expect_err("validation must fail");
    assert!(err.to_string().contains("cycle"));
}
