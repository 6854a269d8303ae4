// src/master.rs

//! Master templates and implementation registries.
//!
//! A master template binds a name, description and template properties to
//! a concrete [`Starter`]/[`Job`] implementation. Implementations are
//! looked up by a string type key in a registry populated at startup;
//! template construction validates the key once, so an unknown type fails
//! configuration loading rather than the first activation.
//!
//! Registries hold boxed factory closures, which lets collaborators (e.g.
//! the message broker) be captured at registration time instead of being
//! smuggled through property bags.

use std::collections::HashMap;
use std::sync::Arc;

use crate::errors::{JobCntrlError, Result};
use crate::model::{Job, Starter};
use crate::props::Props;

/// Factory producing a fresh, uninitialized starter instance.
pub type StarterFactory = Arc<dyn Fn() -> Box<dyn Starter> + Send + Sync>;

/// Factory producing a fresh, uninitialized job instance.
pub type JobFactory = Arc<dyn Fn() -> Box<dyn Job> + Send + Sync>;

/// Registry of starter implementation types, keyed by type key.
#[derive(Clone, Default)]
pub struct StarterRegistry {
    map: HashMap<String, StarterFactory>,
}

impl StarterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        type_key: impl Into<String>,
        factory: impl Fn() -> Box<dyn Starter> + Send + Sync + 'static,
    ) {
        self.map.insert(type_key.into(), Arc::new(factory));
    }

    pub fn get(&self, type_key: &str) -> Option<StarterFactory> {
        self.map.get(type_key).cloned()
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.map.contains_key(type_key)
    }
}

/// Registry of job implementation types, keyed by type key.
#[derive(Clone, Default)]
pub struct JobRegistry {
    map: HashMap<String, JobFactory>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        type_key: impl Into<String>,
        factory: impl Fn() -> Box<dyn Job> + Send + Sync + 'static,
    ) {
        self.map.insert(type_key.into(), Arc::new(factory));
    }

    pub fn get(&self, type_key: &str) -> Option<JobFactory> {
        self.map.get(type_key).cloned()
    }

    pub fn contains(&self, type_key: &str) -> bool {
        self.map.contains_key(type_key)
    }
}

/// Factory template for runtime starters.
pub struct MasterStarter {
    name: String,
    description: String,
    type_key: String,
    props: Props,
    factory: StarterFactory,
}

impl MasterStarter {
    /// Validates the type key against the registry once, at construction.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        type_key: impl Into<String>,
        props: Props,
        registry: &StarterRegistry,
    ) -> Result<Self> {
        let type_key = type_key.into();
        let factory = registry.get(&type_key).ok_or(JobCntrlError::UnknownType {
            kind: "starter",
            key: type_key.clone(),
        })?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            type_key,
            props,
            factory,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    /// Template properties (lowest merge precedence).
    pub fn properties(&self) -> &Props {
        &self.props
    }

    /// Fresh, uninitialized target instance.
    pub(crate) fn new_target(&self) -> Box<dyn Starter> {
        (self.factory)()
    }
}

/// Factory template for runtime jobs.
pub struct MasterJob {
    name: String,
    description: String,
    type_key: String,
    props: Props,
    factory: JobFactory,
}

impl MasterJob {
    /// Validates the type key against the registry once, at construction.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        type_key: impl Into<String>,
        props: Props,
        registry: &JobRegistry,
    ) -> Result<Self> {
        let type_key = type_key.into();
        let factory = registry.get(&type_key).ok_or(JobCntrlError::UnknownType {
            kind: "job",
            key: type_key.clone(),
        })?;
        Ok(Self {
            name: name.into(),
            description: description.into(),
            type_key,
            props,
            factory,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn type_key(&self) -> &str {
        &self.type_key
    }

    pub fn properties(&self) -> &Props {
        &self.props
    }

    /// Fresh, uninitialized job instance. One is created per activation.
    pub(crate) fn new_target(&self) -> Box<dyn Job> {
        (self.factory)()
    }
}
