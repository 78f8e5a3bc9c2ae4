//! haltwatch agent: prints the calling thread and stack before a managed
//! process halts or launches a subprocess.
//!
//! The agent is attached once, at process startup, through [`attach`]. It
//! registers a class-load hook that rewrites `Shutdown.halt(int)` and
//! `ProcessBuilder.start()` and then forces the host to re-run that hook over
//! the copies it has already loaded.

pub mod diagnostics;
pub mod error;
pub mod host;
pub mod instrument;
pub mod interceptor;
pub mod retransform;
pub mod targets;
pub mod template;

#[cfg(test)]
mod test_utils;

pub use diagnostics::StackFrame;
pub use error::AgentError;
pub use host::{ClassFileHook, ClassLoadEvent, HostError, InstrumentationHost};
pub use instrument::MethodInstrumentor;
pub use interceptor::ClassLoadInterceptor;
pub use retransform::RetroactivationCoordinator;
pub use targets::{ClassIdentity, MethodSignature, TargetKind, TargetRegistry, TargetSpec};

use std::sync::Arc;

use anyhow::{Context, Result};
use log::{error, info};

/// Install the agent into `host`.
///
/// Every target class is resolved before anything is registered, so a
/// missing target leaves the host untouched. If retransformation fails the
/// hook is removed again. Errors carry an [`AgentError`] reachable through
/// `downcast_ref`.
pub fn attach<H: InstrumentationHost>(host: &mut H) -> Result<()> {
    let _ = env_logger::try_init();

    let registry = Arc::new(TargetRegistry::builtin().context("building the target table")?);
    info!("Attaching haltwatch agent ({} target classes)", registry.len());

    let coordinator = RetroactivationCoordinator::new(Arc::clone(&registry));
    let classes = coordinator
        .resolve(host)
        .context("resolving target classes")?;

    let hook: Arc<dyn ClassFileHook> = Arc::new(ClassLoadInterceptor::new(registry));
    host.add_class_hook(Arc::clone(&hook));

    if let Err(e) = coordinator.retroactivate(host, &classes) {
        error!("Instrumentation failed, removing class hook: {}", e);
        host.remove_class_hook(&hook);
        return Err(e).context("instrumenting already loaded target classes");
    }

    info!("All bytecode has been instrumented");
    Ok(())
}
