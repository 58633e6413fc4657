use shared::error::{ApiError, ErrorCode};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("{0}")]
    Validation(String),
    #[error("could not read a code from the photo")]
    CodecFailure,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BotError {
    pub fn not_found(what: impl Into<String>) -> Self {
        BotError::NotFound(what.into())
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        BotError::AlreadyExists(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        BotError::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            BotError::NotFound(_) => ErrorCode::NotFound,
            BotError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            BotError::Validation(_) => ErrorCode::Validation,
            BotError::CodecFailure => ErrorCode::CodecFailure,
            BotError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Everything caused by user input; only storage and codec faults are not.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, BotError::Internal(_))
    }
}

impl From<BotError> for ApiError {
    fn from(value: BotError) -> Self {
        ApiError::new(value.code(), value.to_string())
    }
}

pub type BotResult<T> = Result<T, BotError>;
