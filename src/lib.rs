// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod job;
pub mod logging;
pub mod master;
pub mod model;
pub mod persist;
pub mod props;
pub mod runtime;
pub mod starter;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::JobCntrlCfg;
use crate::persist::JsonCompletionPersister;
use crate::props::Props;
use crate::runtime::JobCntrlRuntime;
use crate::starter::message::MessageBroker;

pub use crate::errors::JobCntrlError;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the built-in starter and job registries
/// - the runtime lifecycle (init, start, graceful stop)
/// - optional completion persistence
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;

    if args.dry_run {
        print_dry_run(&cfg);
        return Ok(());
    }

    let broker = Arc::new(MessageBroker::new());
    let mut runtime = JobCntrlRuntime::new(starter::builtin_starters(&broker), job::builtin_jobs());
    if let Some(path) = args.completion_log.as_ref() {
        runtime = runtime.with_persister(Arc::new(JsonCompletionPersister::new(path)));
    }

    runtime.init(cfg)?;
    runtime.start()?;

    if let Some(name) = args.activate.as_ref() {
        let started = runtime.activate(name, Props::new())?;
        info!(starter = %name, started, "startup activation requested");
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, draining activation cycles");
    runtime.stop().await;
    Ok(())
}

/// Simple dry-run output: print masters, starters and jobs.
fn print_dry_run(cfg: &JobCntrlCfg) {
    println!("jobcntrl dry-run");
    println!();

    println!("master starters ({}):", cfg.master.starter.len());
    for (name, master) in cfg.master.starter.iter() {
        println!("  - {name} (type: {})", master.type_key);
    }
    println!("master jobs ({}):", cfg.master.job.len());
    for (name, master) in cfg.master.job.iter() {
        println!("  - {name} (type: {})", master.type_key);
    }

    println!("starters ({}):", cfg.starter.len());
    for (name, starter) in cfg.starter.iter() {
        println!("  - {name} (master: {})", starter.master);
        if !starter.properties.is_empty() {
            println!("      properties: {:?}", starter.properties);
        }
    }

    println!("jobs ({}):", cfg.job.len());
    for (name, job) in cfg.job.iter() {
        println!("  - {name} (master: {}, starter: {})", job.master, job.starter);
        if !job.properties.is_empty() {
            println!("      properties: {:?}", job.properties);
        }
    }
}
