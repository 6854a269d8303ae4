// src/runtime/mod.rs

//! Runtime lifecycle: wiring a configuration into live starters and jobs.
//!
//! `JobCntrlRuntime` moves through three phases. `init` resolves the
//! configuration against the registries and builds the master templates;
//! `start` creates every runtime starter and job, installs bookkeeping
//! hooks and only then enables the triggers; `stop` disables the triggers,
//! drains open activation cycles and tears everything down, returning the
//! runtime to its uninitialized phase.

pub mod job;
pub mod starter;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::model::JobCntrlCfg;
use crate::config::validate::validate_config;
use crate::errors::{JobCntrlError, Result};
use crate::master::{JobRegistry, MasterJob, MasterStarter, StarterRegistry};
use crate::model::{CompletionListener, CompletionSubscription, StarterCompletion, StarterHub};
use crate::persist::CompletionPersister;
use crate::props::Props;

pub use self::job::RuntimeJob;
pub use self::starter::{
    Activation, ActivationHook, ActivationMonitor, JobHandler, RuntimeStarter, PROP_PARALLEL_START,
};

use self::starter::StarterShared;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Initialized,
    Started,
}

/// Shared name-to-starter map backing the [`StarterHub`] view.
type StarterMap = Arc<RwLock<HashMap<String, Arc<StarterShared>>>>;

/// Narrow runtime view handed to starters; resolves names against the
/// live starter map, so lookups fail once the runtime has been stopped.
struct HubView {
    map: StarterMap,
}

impl StarterHub for HubView {
    fn subscribe_completion(
        &self,
        starter: &str,
        listener: CompletionListener,
    ) -> Result<CompletionSubscription> {
        let shared = self
            .map
            .read()
            .expect("lock poisoned")
            .get(starter)
            .cloned()
            .ok_or_else(|| JobCntrlError::UnknownStarter(starter.to_string()))?;
        let id = shared.add_completion_listener(listener);
        let weak = Arc::downgrade(&shared);
        Ok(CompletionSubscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.remove_completion_listener(id);
            }
        }))
    }
}

/// Resolved master templates, built during `init`.
struct MasterModels {
    starters: HashMap<String, Arc<MasterStarter>>,
    jobs: HashMap<String, Arc<MasterJob>>,
}

/// The job-control runtime.
pub struct JobCntrlRuntime {
    starter_registry: StarterRegistry,
    job_registry: JobRegistry,
    persister: Option<Arc<dyn CompletionPersister>>,

    phase: Phase,
    cfg: Option<JobCntrlCfg>,
    masters: Option<MasterModels>,

    starters: HashMap<String, RuntimeStarter>,
    jobs: Vec<RuntimeJob>,
    hub_map: StarterMap,

    /// Open activation cycles across all starters; `stop` waits for zero.
    inflight_tx: watch::Sender<usize>,
    inflight_rx: watch::Receiver<usize>,
}

impl JobCntrlRuntime {
    pub fn new(starter_registry: StarterRegistry, job_registry: JobRegistry) -> Self {
        let (inflight_tx, inflight_rx) = watch::channel(0usize);
        Self {
            starter_registry,
            job_registry,
            persister: None,
            phase: Phase::Uninitialized,
            cfg: None,
            masters: None,
            starters: HashMap::new(),
            jobs: Vec::new(),
            hub_map: Arc::new(RwLock::new(HashMap::new())),
            inflight_tx,
            inflight_rx,
        }
    }

    /// Persist every completion through `persister` (fire-and-forget).
    pub fn with_persister(mut self, persister: Arc<dyn CompletionPersister>) -> Self {
        self.persister = Some(persister);
        self
    }

    /// Validate `cfg` and build the master templates from the registries.
    ///
    /// Fails on unknown type keys, dangling references or chain cycles;
    /// nothing is wired and no trigger fires before `start`.
    pub fn init(&mut self, cfg: JobCntrlCfg) -> Result<()> {
        if self.phase != Phase::Uninitialized {
            return Err(JobCntrlError::InvalidOp(
                "runtime is already initialized".to_string(),
            ));
        }
        validate_config(&cfg)?;

        let mut masters = MasterModels {
            starters: HashMap::new(),
            jobs: HashMap::new(),
        };
        for (name, master) in cfg.master.starter.iter() {
            let template = MasterStarter::new(
                name.clone(),
                master.description.clone(),
                master.type_key.clone(),
                master.properties.clone(),
                &self.starter_registry,
            )?;
            masters.starters.insert(name.clone(), Arc::new(template));
        }
        for (name, master) in cfg.master.job.iter() {
            let template = MasterJob::new(
                name.clone(),
                master.description.clone(),
                master.type_key.clone(),
                master.properties.clone(),
                &self.job_registry,
            )?;
            masters.jobs.insert(name.clone(), Arc::new(template));
        }

        info!(
            master_starters = masters.starters.len(),
            master_jobs = masters.jobs.len(),
            starters = cfg.starter.len(),
            jobs = cfg.job.len(),
            "runtime initialized"
        );
        self.masters = Some(masters);
        self.cfg = Some(cfg);
        self.phase = Phase::Initialized;
        Ok(())
    }

    /// Create all runtime starters and jobs, then enable the triggers.
    ///
    /// Enabling happens strictly after the whole graph is wired, so the
    /// first trigger already sees every subscribed job and every chain
    /// listener. A failure mid-way tears down whatever was built.
    pub fn start(&mut self) -> Result<()> {
        match self.phase {
            Phase::Uninitialized => {
                return Err(JobCntrlError::InvalidOp(
                    "runtime is not initialized".to_string(),
                ));
            }
            Phase::Started => {
                return Err(JobCntrlError::InvalidOp(
                    "runtime is already started".to_string(),
                ));
            }
            Phase::Initialized => {}
        }

        if let Err(err) = self.wire() {
            warn!(%err, "start failed, tearing down partially wired runtime");
            self.teardown();
            self.phase = Phase::Uninitialized;
            return Err(err);
        }
        self.phase = Phase::Started;
        info!(
            starters = self.starters.len(),
            jobs = self.jobs.len(),
            "runtime started"
        );
        Ok(())
    }

    fn wire(&mut self) -> Result<()> {
        let cfg = self
            .cfg
            .as_ref()
            .ok_or_else(|| JobCntrlError::InvalidOp("runtime has no configuration".to_string()))?
            .clone();
        // Templates are Arc'd; cloning the maps keeps the borrow checker
        // out of the wiring loops below.
        let (master_starters, master_jobs) = {
            let masters = self.masters.as_ref().ok_or_else(|| {
                JobCntrlError::InvalidOp("runtime has no master models".to_string())
            })?;
            (masters.starters.clone(), masters.jobs.clone())
        };
        let hub: Arc<dyn StarterHub> = Arc::new(HubView {
            map: Arc::clone(&self.hub_map),
        });

        for (name, starter_cfg) in cfg.starter.iter() {
            // Master existence was checked by validation.
            let master = master_starters.get(&starter_cfg.master).ok_or_else(|| {
                JobCntrlError::UnknownStarter(starter_cfg.master.clone())
            })?;
            let starter = RuntimeStarter::create(
                master,
                name.clone(),
                starter_cfg.description.clone(),
                starter_cfg.properties.clone(),
                Arc::clone(&hub),
            )?;
            self.hub_map
                .write()
                .expect("lock poisoned")
                .insert(name.clone(), Arc::clone(starter.shared()));
            self.starters.insert(name.clone(), starter);
        }

        for (name, job_cfg) in cfg.job.iter() {
            let master = master_jobs.get(&job_cfg.master).ok_or_else(|| {
                JobCntrlError::Config(format!("job '{name}' has unknown master"))
            })?;
            let starter = self
                .starters
                .get(&job_cfg.starter)
                .ok_or_else(|| JobCntrlError::UnknownStarter(job_cfg.starter.clone()))?;
            self.jobs.push(RuntimeJob::create(
                master,
                starter,
                name.clone(),
                job_cfg.description.clone(),
                job_cfg.properties.clone(),
            ));
        }

        for starter in self.starters.values() {
            let tx = self.inflight_tx.clone();
            starter.on_activation_triggered(Arc::new(move |_name: &str| {
                tx.send_modify(|n| *n += 1);
            }));
            let tx = self.inflight_tx.clone();
            starter.on_activation_finalized(Arc::new(move |_name: &str| {
                tx.send_modify(|n| *n = n.saturating_sub(1));
            }));
            if let Some(persister) = self.persister.as_ref() {
                let persister = Arc::clone(persister);
                starter.on_completion(Arc::new(move |completion: &Arc<StarterCompletion>| {
                    let persister = Arc::clone(&persister);
                    let completion = Arc::clone(completion);
                    tokio::task::spawn_blocking(move || {
                        if let Err(err) = persister.store_completion(&completion) {
                            warn!(starter = %completion.starter_name, %err, "persisting completion failed");
                        }
                    });
                }));
            }
        }

        // Triggers go live only after everything above is in place.
        for starter in self.starters.values() {
            starter.set_enabled(true)?;
        }
        Ok(())
    }

    /// Disable all triggers, drain open activation cycles and tear the
    /// runtime down. Returns to the uninitialized phase.
    pub async fn stop(&mut self) {
        if self.phase == Phase::Started {
            for starter in self.starters.values() {
                if let Err(err) = starter.set_enabled(false) {
                    warn!(starter = %starter.name(), %err, "disable during stop failed");
                }
            }
            let mut rx = self.inflight_rx.clone();
            if rx.wait_for(|n| *n == 0).await.is_err() {
                warn!("in-flight tracker dropped during stop");
            }
            info!("all activation cycles drained");
        }
        self.teardown();
        self.cfg = None;
        self.masters = None;
        self.phase = Phase::Uninitialized;
        info!("runtime stopped");
    }

    fn teardown(&mut self) {
        // Jobs first: their Drop unsubscribes from the starters.
        self.jobs.clear();
        for starter in self.starters.values() {
            starter.shutdown();
        }
        self.starters.clear();
        self.hub_map.write().expect("lock poisoned").clear();
    }

    /// Manually request an activation of a named starter.
    ///
    /// Works for any starter type; the manual starter exists purely to be
    /// driven through this path. Returns whether jobs were started.
    pub fn activate(&self, starter: &str, run_props: Props) -> Result<bool> {
        let starter = self
            .starters
            .get(starter)
            .ok_or_else(|| JobCntrlError::UnknownStarter(starter.to_string()))?;
        starter.do_activate(run_props)
    }

    /// Live starter instances by name; empty unless started.
    pub fn starters(&self) -> &HashMap<String, RuntimeStarter> {
        &self.starters
    }

    /// Names of the live job instances.
    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }

    /// Number of currently open activation cycles.
    pub fn in_flight(&self) -> usize {
        *self.inflight_rx.borrow()
    }

    pub fn is_started(&self) -> bool {
        self.phase == Phase::Started
    }

    pub fn is_initialized(&self) -> bool {
        self.phase != Phase::Uninitialized
    }
}
