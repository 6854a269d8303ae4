// src/runtime/starter.rs

//! Runtime wrapper around a concrete [`Starter`].
//!
//! The wrapper owns everything a bare trigger must not know about:
//! job subscriptions, the serialization guard, the per-activation
//! completion barrier and the listener lists. The trigger only ever sees
//! its [`ActivationRelay`]; every activation request funnels through
//! [`StarterShared::do_activate`] here.
//!
//! Locking discipline: the `sync` mutex guards subscriptions and pending
//! barriers and is never held while user code runs. Handlers, hooks and
//! completion listeners are snapshotted under the lock and invoked after
//! it is released, so a listener may re-enter `do_activate` (the chained
//! starter does exactly that).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::SystemTime;

use tracing::{debug, error, info, warn};

use crate::errors::{JobCntrlError, Result};
use crate::master::MasterStarter;
use crate::model::{
    ActivationRelay, CompletionListener, Starter, StarterCompletion, StarterCtx, StarterHub,
};
use crate::props::Props;

/// Run property that lets one activation bypass the serialization guard.
pub const PROP_PARALLEL_START: &str = "Parallel-Start";

/// Job subscription callback. Receives the activation handle for result
/// reporting plus a private clone of the run properties. Returns whether
/// the job accepted the activation.
pub type JobHandler = Arc<dyn Fn(Activation, Props) -> bool + Send + Sync>;

/// Lifecycle hook invoked with the starter name.
pub type ActivationHook = Arc<dyn Fn(&str) + Send + Sync>;

/// Pre-activation veto. Runs after the barrier is created but before any
/// job is invoked; returning `false` cancels the activation.
pub type ActivationMonitor = Arc<dyn Fn(&str, &Props) -> bool + Send + Sync>;

/// One open activation cycle: the barrier collecting job results.
struct PendingActivation {
    id: u64,
    started_at: SystemTime,
    run_props: Props,
    /// Number of jobs subscribed when the barrier was created. Fixed for
    /// the lifetime of the cycle, later (un)subscriptions do not move it.
    expected: usize,
    /// Keyed by lowercased job name; a re-reporting job overwrites.
    results: BTreeMap<String, crate::model::JobResult>,
}

struct HandlerSlot {
    id: u64,
    handler: JobHandler,
}

#[derive(Default)]
struct ActivationSync {
    handlers: Vec<HandlerSlot>,
    pending: Vec<PendingActivation>,
}

#[derive(Default)]
struct Hooks {
    monitor: Option<ActivationMonitor>,
    triggered: Vec<(u64, ActivationHook)>,
    complete: Vec<(u64, CompletionListener)>,
    finalized: Vec<(u64, ActivationHook)>,
}

/// State shared between the [`RuntimeStarter`] facade, activation handles
/// and the relay installed into the wrapped trigger.
pub(crate) struct StarterShared {
    name: String,
    description: String,
    /// Master template properties merged with instance properties.
    props: Props,
    /// The wrapped trigger; `None` after shutdown.
    target: Mutex<Option<Box<dyn Starter>>>,
    sync: Mutex<ActivationSync>,
    hooks: Mutex<Hooks>,
    next_id: AtomicU64,
}

impl StarterShared {
    /// Activation entry point; see the module docs for the locking rules.
    fn do_activate(self: &Arc<Self>, mut run_props: Props) -> Result<bool> {
        {
            let target = self.target.lock().expect("lock poisoned");
            match target.as_ref() {
                None => {
                    return Err(JobCntrlError::InvalidOp(format!(
                        "starter '{}' is already shut down",
                        self.name
                    )));
                }
                Some(t) if !t.enabled() => {
                    debug!(starter = %self.name, "activation ignored, starter disabled");
                    return Ok(false);
                }
                Some(_) => {}
            }
        }

        run_props.copy_run_props(&self.props);
        let concurrent = run_props.get_bool(PROP_PARALLEL_START, false);

        let (cell_id, handlers) = {
            let mut sync = self.sync.lock().expect("lock poisoned");
            if sync.handlers.is_empty() {
                debug!(starter = %self.name, "activation ignored, no jobs subscribed");
                return Ok(false);
            }
            if !concurrent && !sync.pending.is_empty() {
                info!(starter = %self.name, "previous activation still running, not activating");
                return Ok(false);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let expected = sync.handlers.len();
            sync.pending.push(PendingActivation {
                id,
                started_at: SystemTime::now(),
                run_props: run_props.clone(),
                expected,
                results: BTreeMap::new(),
            });
            let snapshot: Vec<JobHandler> =
                sync.handlers.iter().map(|h| Arc::clone(&h.handler)).collect();
            (id, snapshot)
        };

        let monitor = self.hooks.lock().expect("lock poisoned").monitor.clone();
        if let Some(monitor) = monitor {
            if !monitor(&self.name, &run_props) {
                let mut sync = self.sync.lock().expect("lock poisoned");
                sync.pending.retain(|p| p.id != cell_id);
                info!(starter = %self.name, "activation canceled by monitor");
                return Ok(false);
            }
        }

        let triggered: Vec<ActivationHook> = {
            let hooks = self.hooks.lock().expect("lock poisoned");
            hooks.triggered.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for hook in triggered {
            hook(&self.name);
        }

        info!(starter = %self.name, jobs = handlers.len(), "starter activated");
        let activation = Activation {
            starter: Arc::downgrade(self),
            cell: cell_id,
        };
        for handler in handlers {
            handler(activation.clone(), run_props.clone());
        }
        Ok(true)
    }

    /// Deliver one job result into its barrier. Fires completion listeners
    /// and finalized hooks, outside the lock, when the barrier fills.
    fn register_job_result(self: &Arc<Self>, cell: u64, result: crate::model::JobResult) {
        let job_name = result.job_name.clone();
        let completion = {
            let mut sync = self.sync.lock().expect("lock poisoned");
            let Some(idx) = sync.pending.iter().position(|p| p.id == cell) else {
                error!(
                    starter = %self.name,
                    job = %job_name,
                    "job result for an unknown or already-completed activation"
                );
                debug_assert!(false, "job result delivered after its activation completed");
                return;
            };
            let pending = &mut sync.pending[idx];
            if pending.results.insert(job_name.to_lowercase(), result).is_some() {
                warn!(
                    starter = %self.name,
                    job = %job_name,
                    "duplicate job result within one activation, keeping the latest"
                );
            }
            if pending.results.len() < pending.expected {
                None
            } else {
                let done = sync.pending.swap_remove(idx);
                Some(Arc::new(StarterCompletion {
                    starter_name: self.name.clone(),
                    time: done.started_at,
                    run_props: done.run_props,
                    job_results: done.results.into_values().collect(),
                }))
            }
        };

        let Some(completion) = completion else { return };
        info!(starter = %self.name, completion = %completion, "starter activation completed");
        let (complete, finalized) = {
            let hooks = self.hooks.lock().expect("lock poisoned");
            let complete: Vec<CompletionListener> =
                hooks.complete.iter().map(|(_, l)| Arc::clone(l)).collect();
            let finalized: Vec<ActivationHook> =
                hooks.finalized.iter().map(|(_, h)| Arc::clone(h)).collect();
            (complete, finalized)
        };
        for listener in complete {
            listener(&completion);
        }
        for hook in finalized {
            hook(&self.name);
        }
    }

    pub(crate) fn add_completion_listener(&self, listener: CompletionListener) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.hooks
            .lock()
            .expect("lock poisoned")
            .complete
            .push((id, listener));
        id
    }

    pub(crate) fn remove_completion_listener(&self, id: u64) {
        self.hooks
            .lock()
            .expect("lock poisoned")
            .complete
            .retain(|(lid, _)| *lid != id);
    }

    fn add_job_handler(&self, handler: JobHandler) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sync
            .lock()
            .expect("lock poisoned")
            .handlers
            .push(HandlerSlot { id, handler });
        id
    }

    fn remove_job_handler(&self, id: u64) {
        self.sync
            .lock()
            .expect("lock poisoned")
            .handlers
            .retain(|h| h.id != id);
    }
}

/// Handle a job uses to report its result back into the activation cycle
/// it was started by.
#[derive(Clone)]
pub struct Activation {
    starter: Weak<StarterShared>,
    cell: u64,
}

impl Activation {
    /// Report a job result. Results arriving after the owning starter was
    /// shut down are dropped with a warning.
    pub fn add_result(&self, result: crate::model::JobResult) {
        match self.starter.upgrade() {
            Some(shared) => shared.register_job_result(self.cell, result),
            None => warn!(
                job = %result.job_name,
                "job result dropped, starter already shut down"
            ),
        }
    }
}

/// A configured starter instance inside a running runtime.
pub struct RuntimeStarter {
    shared: Arc<StarterShared>,
}

impl RuntimeStarter {
    /// Wrap and initialize a fresh instance produced from `master`.
    ///
    /// The instance comes up disabled; [`RuntimeStarter::set_enabled`]
    /// turns its event source on once the whole graph is wired.
    pub fn create(
        master: &MasterStarter,
        name: impl Into<String>,
        description: impl Into<String>,
        instance_props: Props,
        hub: Arc<dyn StarterHub>,
    ) -> Result<Self> {
        let shared = Arc::new(StarterShared {
            name: name.into(),
            description: description.into(),
            props: Props::overlaid(master.properties(), &instance_props),
            target: Mutex::new(None),
            sync: Mutex::new(ActivationSync::default()),
            hooks: Mutex::new(Hooks::default()),
            next_id: AtomicU64::new(1),
        });

        let weak = Arc::downgrade(&shared);
        let relay = ActivationRelay::new(move |run_props| match weak.upgrade() {
            Some(shared) => shared.do_activate(run_props).unwrap_or_else(|err| {
                error!(starter = %shared.name, %err, "activation rejected");
                false
            }),
            None => {
                warn!("activation request on a starter that was shut down");
                false
            }
        });

        let mut target = master.new_target();
        target.initialize(StarterCtx {
            name: shared.name.clone(),
            description: shared.description.clone(),
            props: shared.props.clone(),
            relay,
            hub,
        })?;
        *shared.target.lock().expect("lock poisoned") = Some(target);
        debug!(starter = %shared.name, kind = %master.type_key(), "runtime starter created");
        Ok(Self { shared })
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn description(&self) -> &str {
        &self.shared.description
    }

    /// Merged template + instance properties.
    pub fn properties(&self) -> &Props {
        &self.shared.props
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<()> {
        let mut target = self.shared.target.lock().expect("lock poisoned");
        match target.as_mut() {
            Some(t) => t.set_enabled(enabled),
            None => Err(JobCntrlError::InvalidOp(format!(
                "starter '{}' is already shut down",
                self.shared.name
            ))),
        }
    }

    pub fn enabled(&self) -> bool {
        let target = self.shared.target.lock().expect("lock poisoned");
        target.as_ref().is_some_and(|t| t.enabled())
    }

    /// Request an activation directly (manual trigger path).
    pub fn do_activate(&self, run_props: Props) -> Result<bool> {
        self.shared.do_activate(run_props)
    }

    /// Number of jobs currently subscribed.
    pub fn job_count(&self) -> usize {
        self.shared
            .sync
            .lock()
            .expect("lock poisoned")
            .handlers
            .len()
    }

    pub fn on_completion(&self, listener: CompletionListener) -> u64 {
        self.shared.add_completion_listener(listener)
    }

    pub fn remove_completion_listener(&self, id: u64) {
        self.shared.remove_completion_listener(id);
    }

    /// Hook fired right after an activation passed all guards.
    pub fn on_activation_triggered(&self, hook: ActivationHook) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .hooks
            .lock()
            .expect("lock poisoned")
            .triggered
            .push((id, hook));
        id
    }

    /// Hook fired after completion listeners, once a cycle is fully done.
    pub fn on_activation_finalized(&self, hook: ActivationHook) -> u64 {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        self.shared
            .hooks
            .lock()
            .expect("lock poisoned")
            .finalized
            .push((id, hook));
        id
    }

    /// Install (or clear) the pre-activation veto.
    pub fn set_activation_monitor(&self, monitor: Option<ActivationMonitor>) {
        self.shared.hooks.lock().expect("lock poisoned").monitor = monitor;
    }

    pub(crate) fn add_job_handler(&self, handler: JobHandler) -> u64 {
        self.shared.add_job_handler(handler)
    }

    pub(crate) fn shared(&self) -> &Arc<StarterShared> {
        &self.shared
    }

    pub(crate) fn shared_weak(&self) -> Weak<StarterShared> {
        Arc::downgrade(&self.shared)
    }

    /// Disable the trigger and drop it. Further relay calls and manual
    /// activations fail; buffered job results are dropped.
    pub(crate) fn shutdown(&self) {
        let target = self.shared.target.lock().expect("lock poisoned").take();
        if let Some(mut target) = target {
            if let Err(err) = target.set_enabled(false) {
                warn!(starter = %self.shared.name, %err, "disable during shutdown failed");
            }
        }
        {
            let mut sync = self.shared.sync.lock().expect("lock poisoned");
            sync.pending.clear();
            sync.handlers.clear();
        }
        *self.shared.hooks.lock().expect("lock poisoned") = Hooks::default();
        debug!(starter = %self.shared.name, "runtime starter shut down");
    }
}

impl std::fmt::Debug for RuntimeStarter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeStarter")
            .field("name", &self.shared.name)
            .field("enabled", &self.enabled())
            .field("jobs", &self.job_count())
            .finish()
    }
}

/// De-registration path used by a dropping runtime job; works through the
/// weak handle so a job outliving its starter is a no-op.
pub(crate) fn remove_job_handler_of(starter: &Weak<StarterShared>, handler_id: u64) {
    if let Some(shared) = starter.upgrade() {
        shared.remove_job_handler(handler_id);
    }
}
