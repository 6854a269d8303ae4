// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::props::Props;

/// Top-level runtime configuration as read from a TOML file.
///
/// ```toml
/// [master.starter.sched]
/// type = "schedule"
/// description = "periodic trigger"
///
/// [master.job.report]
/// type = "log-run"
///
/// [starter.every-minute]
/// master = "sched"
/// properties = { Interval = "60s" }
///
/// [job.minute-report]
/// master = "report"
/// starter = "every-minute"
/// ```
///
/// Section keys are the instance names; `master` fields refer to entries
/// under `[master.starter.*]` / `[master.job.*]` by name.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct JobCntrlCfg {
    /// Master templates from `[master.starter.<name>]` / `[master.job.<name>]`.
    #[serde(default)]
    pub master: MasterSection,

    /// Starter instances from `[starter.<name>]`.
    #[serde(default)]
    pub starter: BTreeMap<String, StarterCfg>,

    /// Job instances from `[job.<name>]`.
    #[serde(default)]
    pub job: BTreeMap<String, JobCfg>,
}

/// `[master]` section: the template catalog.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MasterSection {
    #[serde(default)]
    pub starter: BTreeMap<String, MasterCfg>,

    #[serde(default)]
    pub job: BTreeMap<String, MasterCfg>,
}

/// One master template: implementation type key plus template properties.
#[derive(Debug, Clone, Deserialize)]
pub struct MasterCfg {
    /// Implementation type key; must be registered before `init`.
    #[serde(rename = "type")]
    pub type_key: String,

    #[serde(default)]
    pub description: String,

    /// Template properties (lowest merge precedence).
    #[serde(default)]
    pub properties: Props,
}

/// `[starter.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StarterCfg {
    /// Name of the master starter template this instance is built from.
    pub master: String,

    #[serde(default)]
    pub description: String,

    /// Instance properties; override the template's on identical keys.
    #[serde(default)]
    pub properties: Props,
}

/// `[job.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobCfg {
    /// Name of the master job template this instance is built from.
    pub master: String,

    /// Name of the starter instance this job subscribes to.
    pub starter: String,

    #[serde(default)]
    pub description: String,

    /// Instance properties; override the template's on identical keys.
    #[serde(default)]
    pub properties: Props,
}
