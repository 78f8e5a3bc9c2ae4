//! Applies instrumentation to targets the host loaded before the agent attached.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::{AgentError, Result};
use crate::host::{HostError, InstrumentationHost};
use crate::targets::TargetRegistry;

pub struct RetroactivationCoordinator {
    registry: Arc<TargetRegistry>,
}

impl RetroactivationCoordinator {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve every target class, in table order. Stops at the first one the
    /// host cannot find.
    pub fn resolve<H: InstrumentationHost>(&self, host: &H) -> Result<Vec<H::Class>> {
        self.registry
            .all_targets()
            .map(|(class, _)| {
                debug!("Resolving {}", class.binary_name());
                host.resolve_class(class).ok_or_else(|| {
                    warn!("Target class {} is not available", class.binary_name());
                    AgentError::SetupTargetMissing(class.binary_name())
                })
            })
            .collect()
    }

    /// Ask the host to retransform `classes` in one request, so the hook
    /// sees their current definitions.
    pub fn retroactivate<H: InstrumentationHost>(
        &self,
        host: &mut H,
        classes: &[H::Class],
    ) -> Result<()> {
        info!("Retransforming {} already loaded classes", classes.len());
        host.retransform_classes(classes).map_err(|e| match e {
            HostError::Hook(inner) => *inner,
            HostError::Unmodifiable(class) => {
                AgentError::RedefinitionRejected(format!("class {} is not modifiable", class))
            }
            HostError::Rejected(reason) => AgentError::RedefinitionRejected(reason),
        })
    }
}
