use thiserror::Error;

use crate::model::{DialogException, Redirection};

/// Every way a tagged payload can fail to produce the value a caller asked for.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("cannot decode {expected}: payload is null")]
    NullInput { expected: String },
    #[error("expected type tag {expected} but found {found:?}")]
    TypeMismatch {
        expected: String,
        found: Option<String>,
    },
    #[error("server exception: {0}")]
    ServerException(DialogException),
    #[error("unexpected redirection: {0:?}")]
    UnexpectedRedirection(Box<Redirection>),
    #[error("array payload requires a list tag but {expected} is not one")]
    ListTypeExpected { expected: String },
    #[error("factory for {tag} failed: {message}")]
    FactoryFailure { tag: String, message: String },
    #[error("field {field} of {tag} has the wrong shape: {message}")]
    InvalidField {
        tag: String,
        field: String,
        message: String,
    },
}

impl DecodeError {
    pub(crate) fn mismatch(expected: &str, found: Option<&str>) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: found.map(str::to_string),
        }
    }

    pub(crate) fn factory(tag: &str, message: impl Into<String>) -> Self {
        Self::FactoryFailure {
            tag: tag.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("invalid request url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
    #[error("response from {url} is not JSON: {message}")]
    InvalidBody { url: String, message: String },
    #[error("http client setup failed: {message}")]
    Setup { message: String },
}

/// The single failure channel of the scroller and the dialog service.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ClientError {
    pub fn is_server_exception(&self) -> bool {
        matches!(self, Self::Decode(DecodeError::ServerException(_)))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}
