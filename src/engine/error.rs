use thiserror::Error;

/// Structured engine errors. Every variant carries enough context for a
/// presentation layer to localize the message; callers never receive raw
/// strings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A submission failed a guard precondition. No state was mutated.
    #[error("Validation failed for {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// The stored review state no longer matches what the caller expected.
    /// Recoverable by refetching; never retried by the engine itself.
    #[error("Review state conflict: expected {expected}, found {found}")]
    StateConflict { expected: String, found: String },

    /// A calculation config violated the method mutual-exclusivity rule.
    #[error("Invalid calculation config: {reason}")]
    InvalidConfig { reason: String },
}

impl EngineError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn conflict(expected: impl Into<String>, found: impl Into<String>) -> Self {
        EngineError::StateConflict {
            expected: expected.into(),
            found: found.into(),
        }
    }
}
