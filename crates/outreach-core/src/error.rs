use thiserror::Error;

#[derive(Debug, Error)]
pub enum OutreachError {
    #[error("cannot normalize phone number: {reason}")]
    Normalization { reason: String },

    #[error("processing cancelled")]
    Cancelled,

    #[error("a live session already exists for address {0}")]
    SessionExists(String),

    #[error("no session found for address {0}")]
    SessionNotFound(String),

    #[error("invalid session transition from {from} to {to}")]
    InvalidSessionTransition { from: String, to: String },

    #[error("invalid timezone '{0}': expected a fixed offset like '-03:00'")]
    InvalidTimezone(String),

    #[error("invalid lead status: {0}")]
    InvalidStatus(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("composer error: {0}")]
    Composer(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, OutreachError>;
