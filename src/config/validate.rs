// src/config/validate.rs

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::JobCntrlCfg;
use crate::errors::{JobCntrlError, Result};
use crate::starter::chained;

/// Run semantic validation against a loaded configuration.
///
/// This checks:
/// - every starter instance refers to an existing master starter
/// - every job instance refers to an existing master job and an existing
///   starter instance
/// - every chained starter names an existing predecessor starter via
///   `Completed-Starter`
/// - the chain graph has no cycles
///
/// It does **not** validate starter-specific property values (interval
/// strings, glob patterns, ...); those are checked by the implementations
/// at initialization time, where the type key is actually resolved.
pub fn validate_config(cfg: &JobCntrlCfg) -> Result<()> {
    validate_master_refs(cfg)?;
    validate_chain_refs(cfg)?;
    validate_chain_graph(cfg)?;
    Ok(())
}

fn validate_master_refs(cfg: &JobCntrlCfg) -> Result<()> {
    for (name, starter) in cfg.starter.iter() {
        if !cfg.master.starter.contains_key(&starter.master) {
            return Err(JobCntrlError::Config(format!(
                "starter '{}' refers to unknown master starter '{}'",
                name, starter.master
            )));
        }
    }
    for (name, job) in cfg.job.iter() {
        if !cfg.master.job.contains_key(&job.master) {
            return Err(JobCntrlError::Config(format!(
                "job '{}' refers to unknown master job '{}'",
                name, job.master
            )));
        }
        if !cfg.starter.contains_key(&job.starter) {
            return Err(JobCntrlError::Config(format!(
                "job '{}' refers to unknown starter '{}'",
                name, job.starter
            )));
        }
    }
    Ok(())
}

fn validate_chain_refs(cfg: &JobCntrlCfg) -> Result<()> {
    for (name, pred) in chained_starters(cfg) {
        match pred {
            None => {
                return Err(JobCntrlError::Config(format!(
                    "chained starter '{}' is missing the '{}' property",
                    name,
                    chained::PROP_COMPLETED_STARTER
                )));
            }
            Some(pred) if !cfg.starter.contains_key(&pred) => {
                return Err(JobCntrlError::Config(format!(
                    "chained starter '{}' refers to unknown predecessor '{}'",
                    name, pred
                )));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_chain_graph(cfg: &JobCntrlCfg) -> Result<()> {
    // Edge direction: predecessor -> chained starter. A topological sort
    // fails exactly when the chain graph has a cycle.
    let edges: Vec<(String, String)> = chained_starters(cfg)
        .filter_map(|(name, pred)| pred.map(|p| (p, name)))
        .collect();

    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
    for name in cfg.starter.keys() {
        graph.add_node(name.as_str());
    }
    for (pred, name) in edges.iter() {
        graph.add_edge(pred.as_str(), name.as_str(), ());
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(JobCntrlError::Config(format!(
            "cycle detected in starter chain involving '{}'",
            cycle.node_id()
        ))),
    }
}

/// Starter instances built from the chained master type, with the
/// predecessor name resolved from the merged template + instance
/// properties.
fn chained_starters(cfg: &JobCntrlCfg) -> impl Iterator<Item = (String, Option<String>)> + '_ {
    cfg.starter.iter().filter_map(|(name, starter)| {
        let master = cfg.master.starter.get(&starter.master)?;
        if master.type_key != chained::TYPE_KEY {
            return None;
        }
        let merged = crate::props::Props::overlaid(&master.properties, &starter.properties);
        let pred = merged
            .get(chained::PROP_COMPLETED_STARTER)
            .and_then(|v| v.as_str().map(str::to_string));
        Some((name.clone(), pred))
    })
}
