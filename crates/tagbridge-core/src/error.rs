use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Identifier errors
    #[error("Empty identifier")]
    EmptyIdentifier,

    #[error("Invalid card UID: {0}")]
    InvalidCardUid(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
