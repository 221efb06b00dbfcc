/// Error type definitions
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("Signing failed: {0}")]
    SigningError(String),

    #[error("Verification failed: {0}")]
    VerificationError(String),

    #[error("Invalid key material: {0}")]
    InvalidKey(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        IdentityError::EncodingError(err.to_string())
    }
}

impl From<hex::FromHexError> for IdentityError {
    fn from(err: hex::FromHexError) -> Self {
        IdentityError::EncodingError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, IdentityError>;
