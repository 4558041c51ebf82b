/// Boxed error surfaced by backends, observers and the caller's function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type for unit of work operations
pub type UowResult<T> = Result<T, UowError>;

/// Error type for unit of work operations
#[derive(Debug, thiserror::Error)]
pub enum UowError {
    #[error("unit of work not found, wrap the call with Manager::run_scoped")]
    NotFound,

    #[error("opening resource {key:?}: {source}")]
    ResourceOpen { key: String, source: BoxError },

    #[error("unit of work {id} has already completed")]
    ScopeCompleted { id: String },

    #[error("handle for key {key:?} is not of the requested type")]
    HandleType { key: String },

    #[error("committing transaction {key:?}: {source}")]
    Commit { key: String, source: BoxError },

    #[error("{}", describe_function_failure(.source, .rollback))]
    Function {
        source: BoxError,
        rollback: Option<RollbackError>,
    },

    #[error("transaction observer failed: {source}")]
    Observer { source: BoxError },
}

impl UowError {
    /// The rollback failure folded into this error, if any.
    pub fn rollback_error(&self) -> Option<&RollbackError> {
        match self {
            UowError::Function { rollback, .. } => rollback.as_ref(),
            _ => None,
        }
    }
}

fn describe_function_failure(source: &BoxError, rollback: &Option<RollbackError>) -> String {
    match rollback {
        Some(rollback) => format!("{source}; rolling back transaction: {rollback}"),
        None => source.to_string(),
    }
}

/// A single handle (or observer) that failed to roll back.
#[derive(Debug)]
pub struct RollbackFailure {
    pub key: String,
    pub source: BoxError,
}

/// Aggregate of every rollback failure seen while rolling back a scope.
#[derive(Debug, Default, thiserror::Error)]
#[error("{}", join_failures(.failures))]
pub struct RollbackError {
    failures: Vec<RollbackFailure>,
}

impl RollbackError {
    pub(crate) fn push(&mut self, key: impl Into<String>, source: BoxError) {
        self.failures.push(RollbackFailure {
            key: key.into(),
            source,
        });
    }

    /// Failures in the order the handles were rolled back.
    pub fn failures(&self) -> &[RollbackFailure] {
        &self.failures
    }

    /// Whether no rollback failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn into_result(self) -> Result<(), RollbackError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

fn join_failures(failures: &[RollbackFailure]) -> String {
    failures
        .iter()
        .map(|failure| format!("{}: {}", failure.key, failure.source))
        .collect::<Vec<_>>()
        .join("\n")
}
