use thiserror::Error;

/// Everything that can abort a test run. `Cancelled` is its own kind so
/// callers can tell a user-initiated stop apart from a real fault.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("cannot reach speed test server: {0}")]
    Unreachable(String),

    #[error("test cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ProbeError>;
