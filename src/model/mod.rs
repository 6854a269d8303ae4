// src/model/mod.rs

//! Capability contracts of the job-control core.
//!
//! - [`Starter`]: a trigger. It never runs work itself; it asks for an
//!   activation through its [`ActivationRelay`] and the runtime layer does
//!   the rest.
//! - [`Job`]: a unit of work executed on a background task in response to
//!   a starter activation, producing a [`JobResult`].
//! - [`StarterCompletion`]: the immutable outcome of one activation cycle,
//!   carrying exactly one result per job that was subscribed when the
//!   cycle began.

pub mod job;
pub mod joblog;
pub mod result;
pub mod starter;

pub use job::Job;
pub use joblog::{JobLog, JobLogEntry, JobLogLevel};
pub use result::{AsyncJobResult, JobResult, StarterCompletion, JOB_ERROR_KEY};
pub use starter::{
    ActivationRelay, CompletionListener, CompletionSubscription, Starter, StarterCtx, StarterHub,
};
