use std::error::Error;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;

use jobcntrl::config::{JobCntrlCfg, JobCntrlConfigurator};
use jobcntrl::master::JobRegistry;
use jobcntrl::model::{Job, JobResult, StarterCompletion};
use jobcntrl::props::Props;
use jobcntrl::runtime::JobCntrlRuntime;
use jobcntrl::starter::fswatch::{PROP_DIR_PATH, PROP_FILE_NAME, RPROP_FILE_PATH};
use jobcntrl::starter::schedule::{PROP_INTERVAL, RPROP_SCHEDULED_AT};
use jobcntrl::starter::{builtin_starters, message::MessageBroker};
use jobcntrl::JobCntrlError;

type TestResult = Result<(), Box<dyn Error>>;

const WAIT: Duration = Duration::from_secs(3);
const QUIET: Duration = Duration::from_millis(400);

struct EchoJob {
    name: String,
}

#[async_trait]
impl Job for EchoJob {
    fn initialize(&mut self, name: &str, _description: &str, _props: Props) -> anyhow::Result<()> {
        self.name = name.to_string();
        Ok(())
    }

    async fn run(&mut self, run_props: &Props) -> anyhow::Result<JobResult> {
        Ok(JobResult::success_with(&self.name, run_props.clone()))
    }
}

fn test_jobs() -> JobRegistry {
    let mut registry = JobRegistry::new();
    registry.register("echo", || Box::new(EchoJob { name: String::new() }));
    registry
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
async fn schedule_ticks_repeatedly_with_a_timestamp() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("sched", "schedule", "", Props::new())
        .master_job("echoer", "echo", "", Props::new())
        .starter("ticker", "sched", "", Props::new().with(PROP_INTERVAL, "50ms"))
        .job("tick", "echoer", "ticker", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "ticker");

    let first = timeout(WAIT, completions.recv()).await?.expect("first tick");
    let second = timeout(WAIT, completions.recv()).await?.expect("second tick");

    assert!(first.run_props.get_int(RPROP_SCHEDULED_AT, 0) > 0);
    assert!(
        second.run_props.get_int(RPROP_SCHEDULED_AT, 0)
            >= first.run_props.get_int(RPROP_SCHEDULED_AT, 0)
    );

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn schedule_stops_ticking_when_disabled() -> TestResult {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("sched", "schedule", "", Props::new())
        .master_job("echoer", "echo", "", Props::new())
        .starter("ticker", "sched", "", Props::new().with(PROP_INTERVAL, 50))
        .job("tick", "echoer", "ticker", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "ticker");

    timeout(WAIT, completions.recv()).await?.expect("tick");
    runtime.starters().get("ticker").expect("starter").set_enabled(false)?;

    // Drain whatever was already in flight, then expect silence.
    while timeout(QUIET, completions.recv()).await.is_ok() {}
    assert!(timeout(QUIET, completions.recv()).await.is_err());

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn missing_interval_fails_start() {
    let cfg = JobCntrlConfigurator::new()
        .master_starter("sched", "schedule", "", Props::new())
        .starter("ticker", "sched", "", Props::new())
        .into_cfg();
    let broker = Arc::new(MessageBroker::new());
    let mut runtime = JobCntrlRuntime::new(builtin_starters(&broker), test_jobs());
    runtime.init(cfg).expect("init succeeds");
    let err = runtime.start().expect_err("start must fail");
    assert!(matches!(err, JobCntrlError::Config(_)));
}

#[tokio::test]
async fn file_change_activates_the_watch_starter() -> TestResult {
    let dir = tempfile::tempdir()?;
    let props = Props::new()
        .with(PROP_DIR_PATH, dir.path().display().to_string())
        .with(PROP_FILE_NAME, "*.txt");
    let cfg = JobCntrlConfigurator::new()
        .master_starter("watch", "fswatch", "", Props::new())
        .master_job("echoer", "echo", "", Props::new())
        .starter("inbox", "watch", "", props)
        .job("ingest", "echoer", "inbox", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "inbox");

    let file_path = dir.path().join("order.txt");
    {
        let mut file = std::fs::File::create(&file_path)?;
        file.write_all(b"payload")?;
    }

    let completion = timeout(WAIT, completions.recv()).await?.expect("completion");
    assert!(completion
        .run_props
        .get_str(RPROP_FILE_PATH, "")
        .ends_with("order.txt"));

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn non_matching_and_empty_files_are_ignored() -> TestResult {
    let dir = tempfile::tempdir()?;
    let props = Props::new()
        .with(PROP_DIR_PATH, dir.path().display().to_string())
        .with(PROP_FILE_NAME, "*.txt");
    let cfg = JobCntrlConfigurator::new()
        .master_starter("watch", "fswatch", "", Props::new())
        .master_job("echoer", "echo", "", Props::new())
        .starter("inbox", "watch", "", props)
        .job("ingest", "echoer", "inbox", "", Props::new())
        .into_cfg();
    let mut runtime = started_runtime(cfg)?;
    let mut completions = completions_of(&runtime, "inbox");

    std::fs::write(dir.path().join("notes.csv"), b"wrong extension")?;
    std::fs::File::create(dir.path().join("empty.txt"))?;
    assert!(timeout(QUIET, completions.recv()).await.is_err());

    runtime.stop().await;
    Ok(())
}

#[tokio::test]
async fn missing_watch_directory_fails_start() {
    let props = Props::new().with(PROP_DIR_PATH, "/definitely/not/here");
    let cfg = JobCntrlConfigurator::new()
        .master_starter("watch", "fswatch", "", Props::new())
        .starter("inbox", "watch", "", props)
        .into_cfg();
    let broker = Arc::new(MessageBroker::new());
    let mut runtime = JobCntrlRuntime::new(builtin_starters(&broker), test_jobs());
    runtime.init(cfg).expect("init succeeds");
    let err = runtime.start().expect_err("start must fail");
    assert!(matches!(err, JobCntrlError::Config(_)));
}
