use thiserror::Error;

/// Failure reported by an [`Executor`](super::Executor) implementation.
///
/// The message is the engine's own text; it may carry one of the error codes
/// the compiler embeds in validation calls, which is how post-write integrity
/// and authorization failures travel back from the engine.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("{message}")]
    Engine { message: String },

    #[error("Graph engine unavailable: {message}")]
    Unavailable { message: String },
}

impl ExecutionError {
    pub fn engine(message: impl Into<String>) -> Self {
        ExecutionError::Engine {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutionError::Engine { message } | ExecutionError::Unavailable { message } => message,
        }
    }
}
