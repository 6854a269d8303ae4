// src/starter/manual.rs

use crate::errors::Result;
use crate::model::{Starter, StarterCtx};

/// Type key for the manual starter.
pub const TYPE_KEY: &str = "manual";

/// A starter with no event source of its own.
///
/// It only exists to be activated through the runtime's manual activation
/// path; the enable flag still gates those activations like any other.
#[derive(Debug, Default)]
pub struct Manual {
    enabled: bool,
}

impl Manual {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Starter for Manual {
    fn initialize(&mut self, _ctx: StarterCtx) -> Result<()> {
        Ok(())
    }

    fn set_enabled(&mut self, enabled: bool) -> Result<()> {
        self.enabled = enabled;
        Ok(())
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}
