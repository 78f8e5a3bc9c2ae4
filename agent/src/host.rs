//! Capabilities the agent needs from the managed runtime it is attached to.

use std::borrow::Cow;
use std::sync::Arc;

use thiserror::Error;

use crate::error::AgentError;
use crate::targets::ClassIdentity;

/// A class definition about to become active.
#[derive(Debug, Clone, Copy)]
pub struct ClassLoadEvent<'a> {
    /// Internal name; `None` for hidden and anonymous classes.
    pub name: Option<&'a str>,
    /// Defining loader, `None` for the bootstrap loader.
    pub loader: Option<&'a str>,
    /// Set when the host re-enters hooks for an already loaded class.
    pub redefining: bool,
    pub bytes: &'a [u8],
}

impl<'a> ClassLoadEvent<'a> {
    pub fn define(name: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            name: Some(name),
            loader: None,
            redefining: false,
            bytes,
        }
    }
}

/// Called for every class definition; returns the bytes the host should use.
///
/// Hooks may fire on any thread, concurrently.
pub trait ClassFileHook: Send + Sync {
    fn transform<'a>(&self, event: &ClassLoadEvent<'a>) -> Result<Cow<'a, [u8]>, AgentError>;
}

#[derive(Debug, Error)]
pub enum HostError {
    #[error("class {0} is not modifiable")]
    Unmodifiable(String),

    #[error("class file hook failed: {0}")]
    Hook(Box<AgentError>),

    #[error("{0}")]
    Rejected(String),
}

impl From<AgentError> for HostError {
    fn from(e: AgentError) -> Self {
        HostError::Hook(Box::new(e))
    }
}

pub trait InstrumentationHost {
    /// Handle to a class the host has already loaded.
    type Class;

    fn add_class_hook(&mut self, hook: Arc<dyn ClassFileHook>);

    fn remove_class_hook(&mut self, hook: &Arc<dyn ClassFileHook>);

    /// Look up a class, loading it if the host has not done so yet.
    fn resolve_class(&self, class: &ClassIdentity) -> Option<Self::Class>;

    /// Re-run the registered hooks over the current definitions of `classes`
    /// and install the results. Either all classes are replaced or none.
    fn retransform_classes(&mut self, classes: &[Self::Class]) -> Result<(), HostError>;
}
