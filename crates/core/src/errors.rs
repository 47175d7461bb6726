use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("reaction threshold must be at least 1, got {value}")]
    InvalidThreshold { value: u32 },
    #[error("rule channel must not be empty")]
    EmptyChannel,
    #[error("POAP event id must not be empty")]
    EmptyEventId,
}
