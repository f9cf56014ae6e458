use thiserror::Error;

/// The error type for this crate.
///
/// Cryptographic failures deliberately carry no detail beyond their
/// variant: callers (and anyone feeding them tokens) learn which stage
/// rejected the message, never why.
#[derive(Debug, Error)]
pub enum Error {
    /// The recipient was misconfigured at build time.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// The sealed message, or a JSON structure nested inside it, does not
    /// have the shape the protocol requires.
    #[error("cannot unseal; invalid message: {0}")]
    InvalidMessage(String),
    /// Key material could not be decoded as a P-256 key.
    #[error("invalid key material: {0}")]
    InvalidKey(String),
    /// No (verifying key, signature) pair verified.
    #[error("cannot verify signature")]
    SignatureInvalid,
    /// No configured decrypter produced a plaintext.
    #[error("cannot decrypt")]
    DecryptionFailed,
    /// An expiration time has passed or is unusable.
    #[error("expired {0}")]
    Expired(&'static str),
    /// Trusted sender keys could not be fetched or extracted.
    #[error("{message}")]
    KeyFetch {
        /// What failed.
        message: String,
        /// The collaborator error that caused the failure, when one exists.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    pub(crate) fn invalid_message(message: impl Into<String>) -> Self {
        Error::InvalidMessage(message.into())
    }

    pub(crate) fn key_fetch(message: impl Into<String>) -> Self {
        Error::KeyFetch {
            message: message.into(),
            source: None,
        }
    }
}

/// A specialized `Result` type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
