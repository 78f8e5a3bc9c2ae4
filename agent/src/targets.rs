//! Compiled-in table of the classes and methods that receive diagnostics.
//!
//! The table is built once at attach time and shared read-only between the
//! class-load hook and the retransformation step.

use std::collections::BTreeMap;
use std::fmt;

use haltwatch_classfile::{FieldType, MethodDescriptor, ReturnType};
use thiserror::Error;

/// Class name in internal (slash separated) form, as class-load events report it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClassIdentity(String);

impl ClassIdentity {
    /// Accepts either `java.lang.Shutdown` or `java/lang/Shutdown`.
    pub fn new(name: &str) -> Self {
        ClassIdentity(name.replace('.', "/"))
    }

    pub fn internal_name(&self) -> &str {
        &self.0
    }

    /// Dotted form, e.g. `java.lang.Shutdown`.
    pub fn binary_name(&self) -> String {
        self.0.replace('/', ".")
    }
}

impl fmt::Display for ClassIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassIdentity {
    fn from(name: &str) -> Self {
        ClassIdentity::new(name)
    }
}

/// One method overload: name plus full descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub descriptor: MethodDescriptor,
}

impl MethodSignature {
    pub fn new(name: &str, descriptor: MethodDescriptor) -> Self {
        Self {
            name: name.to_string(),
            descriptor,
        }
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.descriptor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// `Shutdown.halt(int)`: abrupt termination.
    Halt,
    /// `ProcessBuilder.start()`: subprocess launch.
    ProcessStart,
}

impl TargetKind {
    /// The only overload of a target method that gets instrumented.
    pub fn descriptor(self) -> MethodDescriptor {
        match self {
            TargetKind::Halt => MethodDescriptor::new(vec![FieldType::Int], ReturnType::Void),
            TargetKind::ProcessStart => MethodDescriptor::new(
                Vec::new(),
                ReturnType::Value(FieldType::object("java/lang/Process")),
            ),
        }
    }

    pub fn signature(self, method: &str) -> MethodSignature {
        MethodSignature::new(method, self.descriptor())
    }

    /// Whether the injected code reads state from `this`.
    pub fn needs_receiver(self) -> bool {
        matches!(self, TargetKind::ProcessStart)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub kind: TargetKind,
    pub methods: Vec<&'static str>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("class {0} is listed more than once in the target table")]
pub struct DuplicateTarget(pub ClassIdentity);

// ── Registry ─────────────────────────────────────────────────────────

const BUILTIN: &[(&str, TargetKind, &[&str])] = &[
    ("java/lang/Shutdown", TargetKind::Halt, &["halt"]),
    ("java/lang/ProcessBuilder", TargetKind::ProcessStart, &["start"]),
];

/// Immutable map from class to target. There is no way to add entries after
/// construction.
#[derive(Debug, Clone)]
pub struct TargetRegistry {
    targets: BTreeMap<ClassIdentity, TargetSpec>,
}

impl TargetRegistry {
    pub fn builtin() -> Result<Self, DuplicateTarget> {
        let mut builder = RegistryBuilder::default();
        for (class, kind, methods) in BUILTIN {
            builder.insert(class, *kind, methods)?;
        }
        Ok(builder.build())
    }

    /// Method names to instrument in `class`; empty when it is not a target.
    pub fn targets_for(&self, class: &ClassIdentity) -> &[&'static str] {
        self.targets
            .get(class)
            .map(|spec| spec.methods.as_slice())
            .unwrap_or(&[])
    }

    pub fn spec_for(&self, class: &ClassIdentity) -> Option<&TargetSpec> {
        self.targets.get(class)
    }

    /// Every target, ordered by class name.
    pub fn all_targets(&self) -> impl Iterator<Item = (&ClassIdentity, &TargetSpec)> {
        self.targets.iter()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[derive(Default)]
struct RegistryBuilder {
    targets: BTreeMap<ClassIdentity, TargetSpec>,
}

impl RegistryBuilder {
    fn insert(
        &mut self,
        class: &str,
        kind: TargetKind,
        methods: &[&'static str],
    ) -> Result<(), DuplicateTarget> {
        let identity = ClassIdentity::new(class);
        if self.targets.contains_key(&identity) {
            return Err(DuplicateTarget(identity));
        }
        self.targets.insert(
            identity,
            TargetSpec {
                kind,
                methods: methods.to_vec(),
            },
        );
        Ok(())
    }

    fn build(self) -> TargetRegistry {
        TargetRegistry {
            targets: self.targets,
        }
    }
}
