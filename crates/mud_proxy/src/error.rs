//! Proxy-process error types.

use std::path::PathBuf;

use mud_entity::ErrorKind;
use mud_net::NetError;

/// Failures of the account store and password hashing.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("account '{0}' does not exist")]
    NotFound(String),

    #[error("the username '{0}' is already taken")]
    UsernameTaken(String),

    /// Unknown user or wrong password; the two are deliberately
    /// indistinguishable.
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("'{0}' is not a valid username")]
    InvalidUsername(String),

    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),

    #[error("password hashing failed: {0}")]
    Hash(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed account file {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl AccountError {
    /// The taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            AccountError::NotFound(_) | AccountError::InvalidCredentials => ErrorKind::NotFound,
            AccountError::UsernameTaken(_) => ErrorKind::Conflict,
            AccountError::InvalidUsername(_) | AccountError::InvalidEmail(_) => {
                ErrorKind::InvalidInput
            }
            AccountError::Hash(_) | AccountError::Io { .. } | AccountError::Json { .. } => {
                ErrorKind::Internal
            }
        }
    }
}

impl From<password_hash::Error> for AccountError {
    fn from(err: password_hash::Error) -> Self {
        AccountError::Hash(err.to_string())
    }
}

/// Errors raised while serving connections.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Net(#[from] NetError),

    #[error("mail delivery to {to} failed: {source}")]
    Mail {
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connection I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProxyError {
    /// The taxonomy category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProxyError::Account(err) => err.kind(),
            ProxyError::Net(err) => err.kind(),
            ProxyError::Mail { .. } | ProxyError::Io(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_share_one_message() {
        assert_eq!(
            AccountError::InvalidCredentials.to_string(),
            "invalid username or password"
        );
        assert_eq!(AccountError::InvalidCredentials.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_unreachable_world_keeps_its_kind() {
        let err = ProxyError::from(NetError::Unreachable {
            subject: "mud.world.input".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Unreachable);
        assert_eq!(
            ProxyError::from(AccountError::UsernameTaken("bob".into())).kind(),
            ErrorKind::Conflict
        );
    }
}
