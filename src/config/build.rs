// src/config/build.rs

//! Fluent, code-based alternative to the TOML loader.
//!
//! Embedding hosts and tests define a configuration without a file:
//!
//! ```no_run
//! use jobcntrl::config::JobCntrlConfigurator;
//! use jobcntrl::props::Props;
//!
//! let cfg = JobCntrlConfigurator::new()
//!     .master_starter("man", "manual", "manual trigger", Props::new())
//!     .master_job("noop", "log-run", "", Props::new())
//!     .starter("kick", "man", "", Props::new())
//!     .job("work", "noop", "kick", "", Props::new())
//!     .into_cfg();
//! ```
//!
//! The result is the same [`JobCntrlCfg`] the loader produces and goes
//! through the same validation in `JobCntrlRuntime::init`.

use crate::config::model::{JobCfg, JobCntrlCfg, MasterCfg, StarterCfg};
use crate::props::Props;

/// Builder for a [`JobCntrlCfg`].
#[derive(Debug, Default)]
pub struct JobCntrlConfigurator {
    cfg: JobCntrlCfg,
}

impl JobCntrlConfigurator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a master starter template.
    pub fn master_starter(
        mut self,
        name: impl Into<String>,
        type_key: impl Into<String>,
        description: impl Into<String>,
        properties: Props,
    ) -> Self {
        self.cfg.master.starter.insert(
            name.into(),
            MasterCfg {
                type_key: type_key.into(),
                description: description.into(),
                properties,
            },
        );
        self
    }

    /// Define a master job template.
    pub fn master_job(
        mut self,
        name: impl Into<String>,
        type_key: impl Into<String>,
        description: impl Into<String>,
        properties: Props,
    ) -> Self {
        self.cfg.master.job.insert(
            name.into(),
            MasterCfg {
                type_key: type_key.into(),
                description: description.into(),
                properties,
            },
        );
        self
    }

    /// Define a starter instance built from master template `master`.
    pub fn starter(
        mut self,
        name: impl Into<String>,
        master: impl Into<String>,
        description: impl Into<String>,
        properties: Props,
    ) -> Self {
        self.cfg.starter.insert(
            name.into(),
            StarterCfg {
                master: master.into(),
                description: description.into(),
                properties,
            },
        );
        self
    }

    /// Define a job instance subscribed to starter instance `starter`.
    pub fn job(
        mut self,
        name: impl Into<String>,
        master: impl Into<String>,
        starter: impl Into<String>,
        description: impl Into<String>,
        properties: Props,
    ) -> Self {
        self.cfg.job.insert(
            name.into(),
            JobCfg {
                master: master.into(),
                starter: starter.into(),
                description: description.into(),
                properties,
            },
        );
        self
    }

    pub fn into_cfg(self) -> JobCntrlCfg {
        self.cfg
    }
}
