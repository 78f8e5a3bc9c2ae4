use haltwatch_classfile::ClassFileError;
use thiserror::Error;

/// Unrecoverable instrumentation failures. Any of these aborts startup.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AgentError {
    #[error("target class {0} could not be resolved")]
    SetupTargetMissing(String),

    #[error("method {method}{descriptor} not found in {class}")]
    MethodNotFound {
        class: String,
        method: String,
        descriptor: String,
    },

    #[error("failed to inject diagnostics into {class}.{method}: {reason}")]
    CompilationFailure {
        class: String,
        method: String,
        reason: String,
    },

    #[error("host refused to retransform classes: {0}")]
    RedefinitionRejected(String),

    #[error("class file for {class} is malformed: {source}")]
    InvalidClassFile {
        class: String,
        #[source]
        source: ClassFileError,
    },
}

impl AgentError {
    pub(crate) fn compilation(class: &str, method: &str, reason: impl ToString) -> Self {
        AgentError::CompilationFailure {
            class: class.replace('/', "."),
            method: method.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
