// src/starter/chained.rs

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{JobCntrlError, Result};
use crate::model::{
    ActivationRelay, CompletionListener, CompletionSubscription, Starter, StarterCompletion,
    StarterCtx, StarterHub,
};
use crate::props::{PropValue, Props};

/// Type key for the chained starter.
pub const TYPE_KEY: &str = "chained";

/// Property: name of the predecessor starter whose completions drive this
/// one (required).
pub const PROP_COMPLETED_STARTER: &str = "Completed-Starter";

/// Property: with the `Success` policy, still activate when some of the
/// predecessor's jobs failed.
pub const PROP_PREV_ALLOW_FAIL: &str = "Prev-Allow-Fail";

/// Property: `"Success"` (default) or `"Failure"`; which predecessor
/// outcome triggers this starter.
pub const PROP_ACTIVATE_ON_PREV_STATUS: &str = "Activate-On-Previous-Status";

/// Run property carrying the predecessor's full completion as an opaque
/// object, for jobs that want more than the merged result properties.
pub const RPROP_STARTER_COMPLETION: &str = "$Starter-Completion";

/// Run property carrying the merged predecessor results as a nested map.
pub const RPROP_PREVIOUS_RESULTS: &str = "$Previous-Results";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PrevStatus {
    Success,
    Failure,
}

impl PrevStatus {
    fn parse(text: &str) -> Result<Self, String> {
        if text.eq_ignore_ascii_case("success") {
            Ok(PrevStatus::Success)
        } else if text.eq_ignore_ascii_case("failure") {
            Ok(PrevStatus::Failure)
        } else {
            Err(format!("expected 'Success' or 'Failure', got '{text}'"))
        }
    }
}

/// Activates when its predecessor starter completes an activation cycle.
///
/// The chained activation inherits the predecessor's run properties and
/// adds the predecessor's outcome:
/// - `Success` policy: the result objects of all successful predecessor
///   jobs, merged into one map under [`RPROP_PREVIOUS_RESULTS`].
/// - `Failure` policy: one entry per failed job (`Success` flag plus the
///   failure message), keyed by job name.
///
/// Chains of chained starters cascade through this mechanism; the
/// completion listener fires outside the predecessor's activation lock,
/// which is what makes the re-entrant cascade safe.
pub struct Chained {
    name: String,
    predecessor: String,
    allow_fail: bool,
    on_status: PrevStatus,
    relay: Option<ActivationRelay>,
    hub: Option<Arc<dyn StarterHub>>,
    subscription: Option<CompletionSubscription>,
}

impl Chained {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            predecessor: String::new(),
            allow_fail: false,
            on_status: PrevStatus::Success,
            relay: None,
            hub: None,
            subscription: None,
        }
    }
}

impl Default for Chained {
    fn default() -> Self {
        Self::new()
    }
}

impl Starter for Chained {
    fn initialize(&mut self, ctx: StarterCtx) -> Result<()> {
        let predecessor = ctx.props.get_str(PROP_COMPLETED_STARTER, "");
        if predecessor.is_empty() {
            return Err(JobCntrlError::Config(format!(
                "chained starter '{}' is missing the '{PROP_COMPLETED_STARTER}' property",
                ctx.name
            )));
        }
        self.predecessor = predecessor.to_string();
        self.allow_fail = ctx.props.get_bool(PROP_PREV_ALLOW_FAIL, false);
        self.on_status = PrevStatus::parse(
            ctx.props.get_str(PROP_ACTIVATE_ON_PREV_STATUS, "Success"),
        )
        .map_err(|err| {
            JobCntrlError::Config(format!(
                "chained starter '{}': invalid '{PROP_ACTIVATE_ON_PREV_STATUS}': {err}",
                ctx.name
            ))
        })?;
        self.name = ctx.name;
        self.relay = Some(ctx.relay);
        self.hub = Some(ctx.hub);
        debug!(
            starter = %self.name,
            predecessor = %self.predecessor,
            policy = ?self.on_status,
            "chained starter configured"
        );
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled() {
            return Ok(());
        }
        if enabled {
            let relay = self.relay.clone().ok_or_else(|| {
                JobCntrlError::InvalidOp("chained starter enabled before initialization".to_string())
            })?;
            let hub = self.hub.clone().ok_or_else(|| {
                JobCntrlError::InvalidOp("chained starter enabled before initialization".to_string())
            })?;
            let name = self.name.clone();
            let allow_fail = self.allow_fail;
            let on_status = self.on_status;
            let listener: CompletionListener =
                Arc::new(move |completion: &Arc<StarterCompletion>| {
                    handle_completion(&relay, &name, allow_fail, on_status, completion);
                });
            self.subscription = Some(hub.subscribe_completion(&self.predecessor, listener)?);
            info!(starter = %self.name, predecessor = %self.predecessor, "chain enabled");
        } else {
            self.subscription = None;
            info!(starter = %self.name, "chain disabled");
        }
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.subscription.is_some()
    }
}

fn handle_completion(
    relay: &ActivationRelay,
    name: &str,
    allow_fail: bool,
    on_status: PrevStatus,
    completion: &Arc<StarterCompletion>,
) {
    let failed = completion.failures().count();
    let merged = match on_status {
        PrevStatus::Success => {
            if failed > 0 && !allow_fail {
                info!(
                    starter = %name,
                    predecessor = %completion.starter_name,
                    failed,
                    "predecessor had failures, not activating"
                );
                return;
            }
            let mut merged = Props::new();
            for result in completion.successes() {
                merged.apply(&result.result_objects);
            }
            merged
        }
        PrevStatus::Failure => {
            if failed == 0 {
                debug!(starter = %name, "predecessor succeeded, failure chain stays quiet");
                return;
            }
            let mut merged = Props::new();
            for result in completion.failures() {
                let entry = Props::new()
                    .with("Success", false)
                    .with("Message", result.message.clone());
                merged.set(result.job_name.clone(), entry);
            }
            merged
        }
    };

    let mut run_props = completion.run_props.clone();
    run_props.set(
        RPROP_STARTER_COMPLETION,
        PropValue::Obj(Arc::clone(completion) as crate::props::OpaqueValue),
    );
    // A longer chain accumulates: results already forwarded by earlier
    // links stay visible unless this link's entries overwrite them.
    let mut previous = run_props
        .get(RPROP_PREVIOUS_RESULTS)
        .and_then(PropValue::as_map)
        .cloned()
        .unwrap_or_default();
    previous.apply(&merged);
    run_props.set(RPROP_PREVIOUS_RESULTS, previous);
    relay.activate(run_props);
}
