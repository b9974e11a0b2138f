use thiserror::Error;

/// Errors surfaced by the registrar kernel.
///
/// Expected business outcomes (a policy rejection, a waitlist placement, a
/// scheduling conflict, an aborted transaction) are reported through result
/// structs instead. These variants are reserved for contract violations and
/// for the raw lock API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrarError {
    /// Lock conflict or optimistic version mismatch
    #[error("concurrency error: {0}")]
    Concurrency(String),

    /// Input or policy data outside its allowed range
    #[error("validation error: {0}")]
    Validation(String),

    /// No suitable room, or an unresolved hard constraint
    #[error("scheduling error: {0}")]
    Scheduling(String),

    /// A bounded wait was exceeded
    #[error("timeout: {0}")]
    Timeout(String),

    /// Passed through from the storage collaborator
    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },
}

impl RegistrarError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// True for errors `LockManager::execute_with_retry` is allowed to retry.
    pub fn is_concurrency(&self) -> bool {
        matches!(self, Self::Concurrency(_))
    }
}

impl From<serde_json::Error> for RegistrarError {
    fn from(e: serde_json::Error) -> Self {
        Self::Persistence(format!("serialization failed: {}", e))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for RegistrarError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Persistence(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RegistrarError>;
