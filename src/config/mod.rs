// src/config/mod.rs

//! Configuration loading and validation for jobcntrl.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate cross-references and chain acyclicity (`validate.rs`).
//! - Offer a code-based configurator for embedding hosts (`build.rs`).

pub mod build;
pub mod loader;
pub mod model;
pub mod validate;

pub use build::JobCntrlConfigurator;
pub use loader::{load_and_validate, load_from_path};
pub use model::{JobCfg, JobCntrlCfg, MasterCfg, MasterSection, StarterCfg};
pub use validate::validate_config;
