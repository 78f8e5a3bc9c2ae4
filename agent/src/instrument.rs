//! Rewrites target methods so they run a diagnostic prologue first.

use std::borrow::Cow;

use haltwatch_classfile::access::ACC_STATIC;
use haltwatch_classfile::{ClassFile, ClassFileError};
use log::{debug, info};

use crate::error::{AgentError, Result};
use crate::targets::{ClassIdentity, TargetRegistry};
use crate::template;

/// Method attribute left on every rewritten method. Its presence makes a
/// second pass over the same bytes a no-op.
pub const MARKER_ATTRIBUTE: &str = "HaltwatchInstrumented";

pub struct MethodInstrumentor<'r> {
    registry: &'r TargetRegistry,
}

impl<'r> MethodInstrumentor<'r> {
    pub fn new(registry: &'r TargetRegistry) -> Self {
        Self { registry }
    }

    /// Rewrite `method_names` of `class` inside `bytes`.
    ///
    /// Returns the input untouched when there is nothing to do (no names, or
    /// every method already carries the marker). The whole class fails if
    /// any listed method cannot be rewritten.
    pub fn instrument<'a>(
        &self,
        bytes: &'a [u8],
        class: &ClassIdentity,
        method_names: &[&str],
    ) -> Result<Cow<'a, [u8]>> {
        let Some(&first) = method_names.first() else {
            return Ok(Cow::Borrowed(bytes));
        };
        let kind = self
            .registry
            .spec_for(class)
            .map(|spec| spec.kind)
            .ok_or_else(|| {
                AgentError::compilation(class.internal_name(), first, "not a registered target")
            })?;

        let mut class_file =
            ClassFile::parse(bytes).map_err(|source| AgentError::InvalidClassFile {
                class: class.to_string(),
                source,
            })?;

        info!(
            "Instrumenting {} methods for class {}",
            method_names.len(),
            class.binary_name()
        );

        let mut changed = false;
        for &name in method_names {
            let signature = kind.signature(name);
            let descriptor = signature.descriptor.to_string();
            let index = class_file.find_method(name, &descriptor).ok_or_else(|| {
                AgentError::MethodNotFound {
                    class: class.binary_name(),
                    method: name.to_string(),
                    descriptor: descriptor.clone(),
                }
            })?;

            let method = &class_file.methods[index];
            if method.has_attribute(&class_file.constant_pool, MARKER_ATTRIBUTE) {
                debug!("{}.{} is already instrumented, skipping", class, signature);
                continue;
            }
            if kind.needs_receiver() && method.access_flags & ACC_STATIC != 0 {
                return Err(AgentError::compilation(
                    class.internal_name(),
                    name,
                    "method is static but the diagnostic reads the receiver",
                ));
            }

            info!("Inserting new code to the method {}", name);
            let mut code = class_file
                .method_code(index)
                .map_err(|e| AgentError::compilation(class.internal_name(), name, e))?
                .ok_or_else(|| {
                    AgentError::compilation(class.internal_name(), name, "method has no bytecode")
                })?;

            let fragment = template::build(kind, &mut class_file, name)?;
            let compile_err =
                |e: ClassFileError| AgentError::compilation(class.internal_name(), name, e);
            code.insert_prologue(&class_file.constant_pool, &fragment)
                .map_err(compile_err)?;
            class_file.set_method_code(index, &code).map_err(compile_err)?;
            class_file
                .add_method_attribute(index, MARKER_ATTRIBUTE, Vec::new())
                .map_err(compile_err)?;
            debug!(
                "{}.{}: prologue of {} bytes, code now {} bytes",
                class,
                signature,
                fragment.len(),
                code.code.len()
            );
            changed = true;
        }

        if !changed {
            return Ok(Cow::Borrowed(bytes));
        }
        let rewritten = class_file.to_bytes();
        info!("Done! The length of the new bytecode is {}", rewritten.len());
        Ok(Cow::Owned(rewritten))
    }
}
