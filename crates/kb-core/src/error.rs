use thiserror::Error;

/// Coarse error category surfaced to callers (MCP tool responses, REST
/// envelopes, task rows). Maps to the taxonomy in the design document's
/// error handling section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Validation,
    Conflict,
    NotFound,
    RateLimited,
    FatalIngest,
    Auth,
    Storage,
    Internal,
}

#[derive(Debug, Error)]
pub enum KbError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("{0}")]
    FatalIngest(String),

    #[error("Unauthorized")]
    Auth,

    #[error("{0}")]
    Storage(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl KbError {
    pub fn kind(&self) -> Kind {
        match self {
            KbError::Validation(_) => Kind::Validation,
            KbError::Conflict(_) => Kind::Conflict,
            KbError::NotFound(_) => Kind::NotFound,
            KbError::RateLimited(_) => Kind::RateLimited,
            KbError::FatalIngest(_) => Kind::FatalIngest,
            KbError::Auth => Kind::Auth,
            KbError::Storage(_) => Kind::Storage,
            KbError::Internal(_) => Kind::Internal,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            KbError::Validation(_) => "VALIDATION",
            KbError::Conflict(_) => "CONFLICT",
            KbError::NotFound(_) => "NOT_FOUND",
            KbError::RateLimited(_) => "RATE_LIMITED",
            KbError::FatalIngest(_) => "FATAL_INGEST",
            KbError::Auth => "UNAUTHORIZED",
            KbError::Storage(_) => "STORAGE",
            KbError::Internal(_) => "INTERNAL",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        KbError::NotFound(what.into())
    }

    pub fn validation(what: impl Into<String>) -> Self {
        KbError::Validation(what.into())
    }
}

impl From<std::io::Error> for KbError {
    fn from(err: std::io::Error) -> Self {
        KbError::Internal(anyhow::Error::new(err))
    }
}

impl From<rusqlite::Error> for KbError {
    fn from(err: rusqlite::Error) -> Self {
        KbError::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for KbError {
    fn from(err: r2d2::Error) -> Self {
        KbError::Storage(format!("connection pool exhausted: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, KbError>;
