use std::borrow::Cow;
use std::sync::Arc;

use log::{debug, error};

use crate::error::AgentError;
use crate::host::{ClassFileHook, ClassLoadEvent};
use crate::instrument::MethodInstrumentor;
use crate::targets::{ClassIdentity, TargetRegistry};

/// Class-load hook that instruments registered targets and passes every
/// other class through untouched.
pub struct ClassLoadInterceptor {
    registry: Arc<TargetRegistry>,
}

impl ClassLoadInterceptor {
    pub fn new(registry: Arc<TargetRegistry>) -> Self {
        Self { registry }
    }
}

impl ClassFileHook for ClassLoadInterceptor {
    fn transform<'a>(&self, event: &ClassLoadEvent<'a>) -> Result<Cow<'a, [u8]>, AgentError> {
        let Some(name) = event.name else {
            return Ok(Cow::Borrowed(event.bytes));
        };
        let class = ClassIdentity::new(name);
        let methods = self.registry.targets_for(&class);
        if methods.is_empty() {
            return Ok(Cow::Borrowed(event.bytes));
        }

        debug!(
            "Intercepted {} (loader: {}, redefining: {})",
            class,
            event.loader.unwrap_or("bootstrap"),
            event.redefining
        );
        MethodInstrumentor::new(&self.registry)
            .instrument(event.bytes, &class, methods)
            .map_err(|e| {
                error!("Instrumentation of {} failed: {}", class, e);
                e
            })
    }
}
