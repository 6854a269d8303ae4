// src/starter/fswatch.rs

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use notify::{Config as NotifyConfig, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::errors::{JobCntrlError, Result};
use crate::model::{ActivationRelay, Starter, StarterCtx};
use crate::props::Props;

/// Type key for the filesystem watch starter.
pub const TYPE_KEY: &str = "fswatch";

/// Property: directory to observe (required, must exist).
pub const PROP_DIR_PATH: &str = "Directory-Path";

/// Property: glob matched against the file name (optional; every file
/// matches when absent).
pub const PROP_FILE_NAME: &str = "File-Name";

/// Run property carrying the full path of the detected file.
pub const RPROP_FILE_PATH: &str = "Detected-File-Path";

/// Activates when a matching file is created or modified in a directory.
///
/// Zero-length files are skipped: writers commonly create the file first
/// and fill it afterwards, which would otherwise double-trigger.
pub struct FsWatch {
    name: String,
    dir: PathBuf,
    matcher: Option<GlobMatcher>,
    relay: Option<ActivationRelay>,
    watcher: Option<RecommendedWatcher>,
    task: Option<JoinHandle<()>>,
}

impl FsWatch {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            dir: PathBuf::new(),
            matcher: None,
            relay: None,
            watcher: None,
            task: None,
        }
    }
}

impl Default for FsWatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Starter for FsWatch {
    fn initialize(&mut self, ctx: StarterCtx) -> Result<()> {
        let dir = ctx.props.get_str(PROP_DIR_PATH, "");
        if dir.is_empty() {
            return Err(JobCntrlError::Config(format!(
                "fswatch starter '{}' is missing the '{PROP_DIR_PATH}' property",
                ctx.name
            )));
        }
        let dir = PathBuf::from(dir);
        if !dir.is_dir() {
            return Err(JobCntrlError::Config(format!(
                "fswatch starter '{}': '{}' is not an existing directory",
                ctx.name,
                dir.display()
            )));
        }
        let pattern = ctx.props.get_str(PROP_FILE_NAME, "");
        self.matcher = if pattern.is_empty() {
            None
        } else {
            let glob = Glob::new(pattern).map_err(|err| {
                JobCntrlError::Config(format!(
                    "fswatch starter '{}': invalid file pattern '{pattern}': {err}",
                    ctx.name
                ))
            })?;
            Some(glob.compile_matcher())
        };
        self.dir = dir;
        self.name = ctx.name;
        self.relay = Some(ctx.relay);
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        if enabled == self.enabled() {
            return Ok(());
        }
        if enabled {
            let relay = self.relay.clone().ok_or_else(|| {
                JobCntrlError::InvalidOp("fswatch starter enabled before initialization".to_string())
            })?;

            // Channel from the blocking notify callback into the async world.
            let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();
            let mut watcher = RecommendedWatcher::new(
                move |res: notify::Result<Event>| match res {
                    Ok(event) => {
                        let _ = event_tx.send(event);
                    }
                    Err(err) => {
                        eprintln!("jobcntrl: file watch error: {err}");
                    }
                },
                NotifyConfig::default(),
            )
            .map_err(|err| JobCntrlError::Config(format!("file watcher setup failed: {err}")))?;
            watcher
                .watch(&self.dir, RecursiveMode::NonRecursive)
                .map_err(|err| {
                    JobCntrlError::Config(format!(
                        "cannot watch '{}': {err}",
                        self.dir.display()
                    ))
                })?;

            let name = self.name.clone();
            let matcher = self.matcher.clone();
            self.task = Some(tokio::spawn(async move {
                while let Some(event) = event_rx.recv().await {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                        continue;
                    }
                    for path in &event.paths {
                        if !file_matches(path, matcher.as_ref()) {
                            continue;
                        }
                        debug!(starter = %name, path = %path.display(), "file change detected");
                        let mut props = Props::new();
                        props.set(RPROP_FILE_PATH, path.display().to_string());
                        relay.activate(props);
                    }
                }
                debug!(starter = %name, "file watch loop ended");
            }));
            self.watcher = Some(watcher);
            info!(starter = %self.name, dir = %self.dir.display(), "file watch enabled");
        } else {
            self.watcher = None;
            if let Some(task) = self.task.take() {
                task.abort();
            }
            info!(starter = %self.name, "file watch disabled");
        }
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.watcher.is_some()
    }
}

impl Drop for FsWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Name-pattern match plus the zero-length guard.
fn file_matches(path: &Path, matcher: Option<&GlobMatcher>) -> bool {
    let Some(file_name) = path.file_name() else {
        return false;
    };
    if let Some(matcher) = matcher {
        if !matcher.is_match(Path::new(file_name)) {
            return false;
        }
    }
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() && meta.len() > 0 => true,
        Ok(_) => {
            debug!(path = %path.display(), "ignoring empty or non-file path");
            false
        }
        Err(err) => {
            warn!(path = %path.display(), %err, "cannot stat detected path");
            false
        }
    }
}
