// src/model/starter.rs

use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::model::result::StarterCompletion;
use crate::props::Props;

/// Handle a starter uses to request an activation.
///
/// The relay is the only path from a trigger condition into the runtime
/// layer: the runtime starter wrapping the trigger installs it at
/// initialization, and every call lands in the wrapper's activation and
/// completion coordination. Returns `true` when jobs were actually
/// started (enabled, at least one job subscribed, not rejected by the
/// serialization guard, not canceled).
#[derive(Clone)]
pub struct ActivationRelay {
    inner: Arc<dyn Fn(Props) -> bool + Send + Sync>,
}

impl ActivationRelay {
    pub fn new(f: impl Fn(Props) -> bool + Send + Sync + 'static) -> Self {
        Self { inner: Arc::new(f) }
    }

    pub fn activate(&self, run_props: Props) -> bool {
        (self.inner)(run_props)
    }
}

impl fmt::Debug for ActivationRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActivationRelay").finish()
    }
}

/// Callback invoked with the completion of one activation cycle.
///
/// Listeners run on whatever task delivered the last job result; they must
/// not assume a specific thread. Re-entrant activation from within a
/// listener is supported (the chained starter relies on it).
pub type CompletionListener = Arc<dyn Fn(&Arc<StarterCompletion>) + Send + Sync>;

/// Guard for a completion subscription; dropping it unsubscribes.
pub struct CompletionSubscription {
    unsub: Option<Box<dyn FnOnce() + Send>>,
}

impl CompletionSubscription {
    pub fn new(unsub: impl FnOnce() + Send + 'static) -> Self {
        Self {
            unsub: Some(Box::new(unsub)),
        }
    }
}

impl Drop for CompletionSubscription {
    fn drop(&mut self) {
        if let Some(f) = self.unsub.take() {
            f();
        }
    }
}

impl fmt::Debug for CompletionSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSubscription").finish()
    }
}

/// Read-only runtime view handed to starters at initialization.
///
/// This is deliberately narrow: a starter can subscribe to another
/// starter's completions by name, nothing else. Lookups fail with
/// `UnknownStarter` once the owning runtime has been stopped.
pub trait StarterHub: Send + Sync {
    fn subscribe_completion(
        &self,
        starter: &str,
        listener: CompletionListener,
    ) -> Result<CompletionSubscription>;
}

/// Everything a starter receives at initialization.
pub struct StarterCtx {
    /// Unique starter instance name.
    pub name: String,
    pub description: String,
    /// Template properties merged with instance properties (instance wins).
    pub props: Props,
    pub relay: ActivationRelay,
    pub hub: Arc<dyn StarterHub>,
}

/// A trigger abstraction.
///
/// Implementations turn some external condition (a timer tick, a changed
/// file, a published message, a predecessor's completion) into calls on
/// their [`ActivationRelay`]. They should come up disabled and only turn
/// their event source on in `set_enabled(true)`, so the runtime can wire
/// the whole graph before anything fires.
pub trait Starter: Send {
    fn initialize(&mut self, ctx: StarterCtx) -> Result<()>;

    /// Turn the starter's event source on or off.
    fn set_enabled(&mut self, enabled: bool) -> Result<()>;

    fn enabled(&self) -> bool;
}
