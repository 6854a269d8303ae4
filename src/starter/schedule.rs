// src/starter/schedule.rs

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::errors::{JobCntrlError, Result};
use crate::model::{ActivationRelay, Starter, StarterCtx};
use crate::props::Props;

/// Type key for the schedule starter.
pub const TYPE_KEY: &str = "schedule";

/// Property: activation interval. A bare integer is milliseconds; strings
/// accept `ms` / `s` / `m` / `h` suffixes (`"30s"`, `"250ms"`).
pub const PROP_INTERVAL: &str = "Interval";

/// Run property carrying the tick's unix timestamp in milliseconds.
pub const RPROP_SCHEDULED_AT: &str = "Scheduled-At";

/// Activates on a fixed interval while enabled.
///
/// The interval task is spawned on enable and aborted on disable. An
/// activation that is rejected (serialization guard, no jobs) is simply
/// skipped; the schedule never queues up missed ticks.
pub struct Schedule {
    name: String,
    interval: Duration,
    relay: Option<ActivationRelay>,
    task: Option<JoinHandle<()>>,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            interval: Duration::ZERO,
            relay: None,
            task: None,
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

impl Starter for Schedule {
    fn initialize(&mut self, ctx: StarterCtx) -> Result<()> {
        let spec = ctx.props.get(PROP_INTERVAL).ok_or_else(|| {
            JobCntrlError::Config(format!(
                "schedule starter '{}' is missing the '{PROP_INTERVAL}' property",
                ctx.name
            ))
        })?;
        self.interval = match spec.as_str() {
            Some(text) => parse_interval(text).map_err(|err| {
                JobCntrlError::Config(format!(
                    "schedule starter '{}': invalid interval '{text}': {err}",
                    ctx.name
                ))
            })?,
            None => {
                let ms = spec.as_int().ok_or_else(|| {
                    JobCntrlError::Config(format!(
                        "schedule starter '{}': '{PROP_INTERVAL}' must be a string or integer",
                        ctx.name
                    ))
                })?;
                if ms <= 0 {
                    return Err(JobCntrlError::Config(format!(
                        "schedule starter '{}': interval must be positive",
                        ctx.name
                    )));
                }
                Duration::from_millis(ms as u64)
            }
        };
        self.name = ctx.name;
        self.relay = Some(ctx.relay);
        let interval_ms = self.interval.as_millis() as u64;
        debug!(starter = %self.name, interval_ms, "schedule configured");
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled() {
            return Ok(());
        }
        if enabled {
            let relay = self.relay.clone().ok_or_else(|| {
                JobCntrlError::InvalidOp("schedule starter enabled before initialization".to_string())
            })?;
            let name = self.name.clone();
            let period = self.interval;
            self.task = Some(tokio::spawn(async move {
                let mut ticks = tokio::time::interval(period);
                // The first tick fires immediately; the schedule starts
                // one full interval after enabling.
                ticks.tick().await;
                loop {
                    ticks.tick().await;
                    let now_ms = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_millis() as i64)
                        .unwrap_or(0);
                    let mut props = Props::new();
                    props.set(RPROP_SCHEDULED_AT, now_ms);
                    if !relay.activate(props) {
                        debug!(starter = %name, "scheduled tick skipped");
                    }
                }
            }));
            info!(starter = %self.name, "schedule enabled");
        } else if let Some(task) = self.task.take() {
            task.abort();
            info!(starter = %self.name, "schedule disabled");
        }
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for Schedule {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Parse an interval spec: bare digits are milliseconds, otherwise a
/// number with an `ms`/`s`/`m`/`h` suffix.
fn parse_interval(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("empty interval".to_string());
    }
    let (digits, unit) = match text.find(|c: char| !c.is_ascii_digit()) {
        None => (text, ""),
        Some(idx) => text.split_at(idx),
    };
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("'{digits}' is not a number"))?;
    if value == 0 {
        return Err("interval must be positive".to_string());
    }
    let duration = match unit.trim() {
        "" | "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value * 60),
        "h" => Duration::from_secs(value * 3600),
        other => return Err(format!("unknown unit '{other}'")),
    };
    Ok(duration)
}
