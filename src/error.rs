use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    LastMap,
    InvalidOperation,
    CorruptState,
    NotFound,
    Storage,
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("cannot delete the last remaining map")]
    LastMap,

    #[error("operation not allowed: {0}")]
    InvalidOperation(String),

    #[error("persisted state under `{key}` is corrupt: {source}")]
    CorruptState {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("map {0} does not exist")]
    MapNotFound(u32),

    #[error("node `{0}` does not exist")]
    NodeNotFound(String),

    #[error("storage write to `{key}` failed: {message}")]
    Storage { key: String, message: String },
}

impl WorkspaceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::LastMap => ErrorKind::LastMap,
            Self::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Self::CorruptState { .. } => ErrorKind::CorruptState,
            Self::MapNotFound(_) | Self::NodeNotFound(_) => ErrorKind::NotFound,
            Self::Storage { .. } => ErrorKind::Storage,
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidOperation(reason.into())
    }

    pub(crate) fn empty_name() -> Self {
        Self::Validation {
            field: "name",
            reason: "must not be empty".to_string(),
        }
    }
}

pub type WorkspaceResult<T> = Result<T, WorkspaceError>;
