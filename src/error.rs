use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Gateway or network unreachable. Always recoverable.
    #[error("Connection error: {0}")]
    Transport(String),
    #[error("Not authenticated with Gmail")]
    AuthRequired,
    #[error("No credentials saved")]
    CredentialsRequired,
    /// The mail service refused the request; carries its error detail verbatim.
    #[error("{0}")]
    RemoteRejected(String),
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<keyring::Error> for Error {
    fn from(e: keyring::Error) -> Self {
        Error::Storage(format!("Keyring error: {}", e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(format!("Serialization error: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
