//! Per-owner "use hardware acceleration" flag
//!
//! Each worker, task, or request carries its own [`ExecutionContext`] and
//! passes it explicitly; there is no ambient thread-local state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::registry::Registry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionContext {
    use_acceleration: bool,
}

impl ExecutionContext {
    pub fn new(use_acceleration: bool) -> Self {
        Self { use_acceleration }
    }

    /// Acceleration enabled when any detected platform has at least one
    /// device
    ///
    /// Triggers detection if the registry has not detected yet.
    pub fn from_registry(registry: &Registry) -> Result<Self> {
        let epoch = registry.get_all()?;
        let use_acceleration = epoch.platforms().iter().any(|p| p.device_count() > 0);
        debug!(use_acceleration, epoch = epoch.number(), "Execution context initialised");
        Ok(Self { use_acceleration })
    }

    pub fn use_acceleration(&self) -> bool {
        self.use_acceleration
    }

    pub fn set_use_acceleration(&mut self, enabled: bool) {
        self.use_acceleration = enabled;
    }
}
