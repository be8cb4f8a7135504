//! Unified error type.

/// The error type returned by the fallible response operations.
///
/// Application-level outcomes (403, 404, etc.) are expressed as HTTP status
/// codes returned from middleware or handlers, not as `Error`s. This type
/// surfaces infrastructure failures and misuse of a response that can no
/// longer be written to.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// A lifecycle hook returned an error. Carried back, untouched, to the
    /// caller of the write or end operation that triggered it.
    #[error("response hook failed: {0}")]
    Hook(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("response has already ended")]
    Ended,

    #[error("response connection is closed")]
    Closed,

    #[error("invalid header `{0}`")]
    InvalidHeader(String),
}

impl Error {
    /// Wraps an arbitrary error raised inside a lifecycle hook.
    pub fn hook(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Hook(err.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
