// src/starter/message.rs

//! In-process message broker and the message subscription starter.
//!
//! The broker is deliberately small: fire-and-forget publish to named
//! subjects, plus an optional request path where the responder answers
//! with the completion of the activation cycle the message caused.
//! Handlers are collected under the broker lock and invoked outside it,
//! so a handler may publish again without deadlocking.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{JobCntrlError, Result};
use crate::model::{
    ActivationRelay, CompletionListener, Starter, StarterCompletion, StarterCtx, StarterHub,
};
use crate::props::{OpaqueValue, PropValue, Props};

/// Type key for the message subscription starter.
pub const TYPE_KEY: &str = "message";

/// Property: subject to subscribe to; defaults to the starter's name.
pub const PROP_MSG_SUBJECT: &str = "Message-Subject";

/// Property: debounce window in milliseconds. While messages keep
/// arriving within the window only the latest one survives; the starter
/// activates once the subject has been quiet for a full window.
pub const PROP_MSG_BUFFER: &str = "Message-Buffer";

/// Property: answer requests with the resulting starter completion.
pub const PROP_RETURN_RESULT: &str = "Return-Result";

/// Property key under which a message can carry an opaque payload object.
pub const PROP_MSG_OBJECT: &str = "Msg-Object";

/// Run property stamped onto every request activation. The responder
/// matches completions back to their request through it.
pub const RPROP_REQUEST_ID: &str = "$Request-Id";

static REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// A message published to a broker subject.
#[derive(Clone, Debug)]
pub struct JobMessage {
    /// Free-form sender identification, for logs.
    pub source: String,
    /// Properties handed to the activation as run properties.
    pub job_props: Props,
}

impl JobMessage {
    pub fn new(source: impl Into<String>, job_props: Props) -> Self {
        Self {
            source: source.into(),
            job_props,
        }
    }

    /// Message carrying one opaque payload under [`PROP_MSG_OBJECT`].
    pub fn with_object(source: impl Into<String>, object: OpaqueValue) -> Self {
        let mut props = Props::new();
        props.set(PROP_MSG_OBJECT, PropValue::Obj(object));
        Self::new(source, props)
    }
}

type MessageHandler = Arc<dyn Fn(&JobMessage) + Send + Sync>;
type RequestFuture = Pin<Box<dyn Future<Output = Arc<StarterCompletion>> + Send>>;
type RequestHandler = Arc<dyn Fn(JobMessage) -> RequestFuture + Send + Sync>;

#[derive(Default)]
struct BrokerState {
    next_id: u64,
    subscriptions: HashMap<String, Vec<(u64, MessageHandler)>>,
    /// At most one responder per subject; a second registration replaces
    /// the first with a warning.
    responders: HashMap<String, (u64, RequestHandler)>,
}

/// In-process publish/subscribe broker.
#[derive(Default)]
pub struct MessageBroker {
    state: Mutex<BrokerState>,
}

impl MessageBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire-and-forget publish. Returns the number of handlers invoked.
    pub fn publish(&self, subject: &str, message: JobMessage) -> usize {
        let handlers: Vec<MessageHandler> = {
            let state = self.state.lock().expect("lock poisoned");
            state
                .subscriptions
                .get(subject)
                .map(|subs| subs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        if handlers.is_empty() {
            debug!(subject, source = %message.source, "message published to silent subject");
            return 0;
        }
        let count = handlers.len();
        for handler in handlers {
            handler(&message);
        }
        count
    }

    /// Publish to a responder and await the completion of the activation
    /// cycle the message causes. `None` when the subject has no responder.
    pub async fn request(
        &self,
        subject: &str,
        message: JobMessage,
    ) -> Option<Arc<StarterCompletion>> {
        let responder = {
            let state = self.state.lock().expect("lock poisoned");
            state.responders.get(subject).map(|(_, h)| Arc::clone(h))
        };
        match responder {
            Some(handler) => Some(handler(message).await),
            None => {
                debug!(subject, "request on subject without responder");
                None
            }
        }
    }

    pub fn subscribe(&self, subject: &str, handler: MessageHandler) -> u64 {
        let mut state = self.state.lock().expect("lock poisoned");
        state.next_id += 1;
        let id = state.next_id;
        state
            .subscriptions
            .entry(subject.to_string())
            .or_default()
            .push((id, handler));
        id
    }

    pub fn subscribe_request(&self, subject: &str, handler: RequestHandler) -> u64 {
        let mut state = self.state.lock().expect("lock poisoned");
        state.next_id += 1;
        let id = state.next_id;
        if state
            .responders
            .insert(subject.to_string(), (id, handler))
            .is_some()
        {
            warn!(subject, "replacing existing request responder");
        }
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut state = self.state.lock().expect("lock poisoned");
        for subs in state.subscriptions.values_mut() {
            subs.retain(|(sid, _)| *sid != id);
        }
        state.responders.retain(|_, (sid, _)| *sid != id);
    }
}

impl std::fmt::Debug for MessageBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("lock poisoned");
        f.debug_struct("MessageBroker")
            .field("subjects", &state.subscriptions.len())
            .field("responders", &state.responders.len())
            .finish()
    }
}

/// Activates when a message arrives on a broker subject.
pub struct MessageSubscription {
    broker: Arc<MessageBroker>,
    name: String,
    subject: String,
    buffer: Option<Duration>,
    return_result: bool,
    relay: Option<ActivationRelay>,
    hub: Option<Arc<dyn StarterHub>>,
    subscription: Option<u64>,
    debounce: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MessageSubscription {
    pub fn new(broker: Arc<MessageBroker>) -> Self {
        Self {
            broker,
            name: String::new(),
            subject: String::new(),
            buffer: None,
            return_result: false,
            relay: None,
            hub: None,
            subscription: None,
            debounce: Arc::new(Mutex::new(None)),
        }
    }
}

impl Starter for MessageSubscription {
    fn initialize(&mut self, ctx: StarterCtx) -> Result<()> {
        self.subject = ctx.props.get_str(PROP_MSG_SUBJECT, &ctx.name).to_string();
        let buffer_ms = ctx.props.get_int(PROP_MSG_BUFFER, 0);
        self.buffer = (buffer_ms > 0).then(|| Duration::from_millis(buffer_ms as u64));
        self.return_result = ctx.props.get_bool(PROP_RETURN_RESULT, false);
        if self.return_result && self.buffer.is_some() {
            return Err(JobCntrlError::Config(format!(
                "message starter '{}': '{PROP_MSG_BUFFER}' and '{PROP_RETURN_RESULT}' are mutually exclusive",
                ctx.name
            )));
        }
        self.name = ctx.name;
        self.relay = Some(ctx.relay);
        self.hub = Some(ctx.hub);
        debug!(
            starter = %self.name,
            subject = %self.subject,
            buffered = self.buffer.is_some(),
            request = self.return_result,
            "message subscription configured"
        );
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled() {
            return Ok(());
        }
        if enabled {
            let relay = self.relay.clone().ok_or_else(|| {
                JobCntrlError::InvalidOp("message starter enabled before initialization".to_string())
            })?;
            let id = if self.return_result {
                let hub = self.hub.clone().ok_or_else(|| {
                    JobCntrlError::InvalidOp(
                        "message starter enabled before initialization".to_string(),
                    )
                })?;
                let starter_name = self.name.clone();
                self.broker.subscribe_request(
                    &self.subject,
                    Arc::new(move |message: JobMessage| {
                        let relay = relay.clone();
                        let hub = Arc::clone(&hub);
                        let starter_name = starter_name.clone();
                        Box::pin(handle_request(relay, hub, starter_name, message))
                            as RequestFuture
                    }),
                )
            } else {
                let buffer = self.buffer;
                let debounce = Arc::clone(&self.debounce);
                let starter_name = self.name.clone();
                self.broker.subscribe(
                    &self.subject,
                    Arc::new(move |message: &JobMessage| match buffer {
                        None => {
                            relay.activate(message.job_props.clone());
                        }
                        Some(window) => {
                            let mut slot = debounce.lock().expect("lock poisoned");
                            if let Some(prev) = slot.take() {
                                prev.abort();
                                debug!(starter = %starter_name, "debounce window restarted");
                            }
                            let relay = relay.clone();
                            let props = message.job_props.clone();
                            *slot = Some(tokio::spawn(async move {
                                tokio::time::sleep(window).await;
                                relay.activate(props);
                            }));
                        }
                    }),
                )
            };
            self.subscription = Some(id);
            info!(starter = %self.name, subject = %self.subject, "message subscription enabled");
        } else {
            if let Some(id) = self.subscription.take() {
                self.broker.unsubscribe(id);
            }
            if let Some(task) = self.debounce.lock().expect("lock poisoned").take() {
                task.abort();
            }
            info!(starter = %self.name, "message subscription disabled");
        }
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.subscription.is_some()
    }
}

impl Drop for MessageSubscription {
    fn drop(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.broker.unsubscribe(id);
        }
        if let Some(task) = self.debounce.lock().expect("lock poisoned").take() {
            task.abort();
        }
    }
}

/// Request path: activate and answer with the activation's completion.
///
/// The completion listener is registered on the starter's own completions
/// before the relay is called, so the answer cannot be missed even when
/// the jobs finish immediately. Each request's activation carries a fresh
/// [`RPROP_REQUEST_ID`] run property and the completion is matched on it,
/// which tells concurrent cycles apart and keeps working when the
/// starter's run-prop template overwrites keys of the request itself.
async fn handle_request(
    relay: ActivationRelay,
    hub: Arc<dyn StarterHub>,
    starter_name: String,
    message: JobMessage,
) -> Arc<StarterCompletion> {
    let request_id = REQUEST_SEQ.fetch_add(1, Ordering::Relaxed) as i64;
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let listener: CompletionListener = Arc::new(move |completion: &Arc<StarterCompletion>| {
        if completion.run_props.get_int(RPROP_REQUEST_ID, 0) == request_id {
            if let Some(tx) = tx.lock().expect("lock poisoned").take() {
                let _ = tx.send(Arc::clone(completion));
            }
        }
    });

    let subscription = match hub.subscribe_completion(&starter_name, listener) {
        Ok(sub) => sub,
        Err(err) => {
            warn!(starter = %starter_name, %err, "request cannot observe completions");
            return Arc::new(StarterCompletion::empty(starter_name, message.job_props));
        }
    };

    let run_props = message.job_props.clone().with(RPROP_REQUEST_ID, request_id);
    if !relay.activate(run_props) {
        drop(subscription);
        debug!(starter = %starter_name, "request activated nothing, answering empty completion");
        return Arc::new(StarterCompletion::empty(starter_name, message.job_props));
    }
    match rx.await {
        Ok(completion) => completion,
        Err(_) => {
            warn!(starter = %starter_name, "completion channel closed before the answer");
            Arc::new(StarterCompletion::empty(starter_name, message.job_props))
        }
    }
}
