// src/starter/mod.rs

//! Built-in starter implementations.
//!
//! Every implementation here is a pure trigger: it turns some external
//! condition into calls on the [`ActivationRelay`] it received at
//! initialization, and honors `set_enabled` by tearing its event source
//! down. Activation guards, barriers and completion fan-out all live in
//! the runtime layer.
//!
//! [`ActivationRelay`]: crate::model::ActivationRelay

pub mod chained;
pub mod fswatch;
pub mod manual;
pub mod message;
pub mod schedule;

use std::sync::Arc;

use crate::master::StarterRegistry;
use crate::starter::message::MessageBroker;

pub use chained::Chained;
pub use fswatch::FsWatch;
pub use manual::Manual;
pub use message::{JobMessage, MessageSubscription};
pub use schedule::Schedule;

/// Registry populated with every built-in starter type.
///
/// The message subscription starter captures the broker at registration,
/// so all instances created from one registry share it.
pub fn builtin_starters(broker: &Arc<MessageBroker>) -> StarterRegistry {
    let mut registry = StarterRegistry::new();
    registry.register(manual::TYPE_KEY, || Box::new(Manual::new()));
    registry.register(schedule::TYPE_KEY, || Box::new(Schedule::new()));
    registry.register(fswatch::TYPE_KEY, || Box::new(FsWatch::new()));
    registry.register(chained::TYPE_KEY, || Box::new(Chained::new()));
    let broker = Arc::clone(broker);
    registry.register(message::TYPE_KEY, move || {
        Box::new(MessageSubscription::new(Arc::clone(&broker)))
    });
    registry
}
