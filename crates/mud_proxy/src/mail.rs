//! Out-of-band delivery of new-account passwords.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ProxyError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl Mail {
    /// The message carrying a freshly generated password.
    #[must_use]
    pub fn new_account(username: &str, email: &str, password: &str) -> Self {
        Self {
            to: email.to_string(),
            subject: "Your new account".to_string(),
            body: format!(
                "Welcome, {username}!\n\nYour password is: {password}\n\nConnect again and log in with it.\n"
            ),
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync + std::fmt::Debug {
    /// # Errors
    ///
    /// Returns [`ProxyError::Mail`] if the message could not be handed off.
    async fn send(&self, mail: &Mail) -> Result<(), ProxyError>;
}

/// Writes each message to its own file in a directory.
#[derive(Debug, Clone)]
pub struct FileOutboxMailer {
    dir: PathBuf,
}

impl FileOutboxMailer {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Mailer for FileOutboxMailer {
    async fn send(&self, mail: &Mail) -> Result<(), ProxyError> {
        let failed = |source| ProxyError::Mail {
            to: mail.to.clone(),
            source,
        };
        tokio::fs::create_dir_all(&self.dir).await.map_err(failed)?;
        let path = self.dir.join(format!("{}.eml", Uuid::new_v4()));
        let text = format!(
            "To: {}\nSubject: {}\n\n{}",
            mail.to, mail.subject, mail.body
        );
        tokio::fs::write(&path, text).await.map_err(failed)?;
        info!(to = %mail.to, path = %path.display(), "mail written to outbox");
        Ok(())
    }
}

/// Logs the delivery instead of sending anything. The body is only visible
/// at debug level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: &Mail) -> Result<(), ProxyError> {
        info!(to = %mail.to, subject = %mail.subject, "mail not sent, no outbox configured");
        debug!(to = %mail.to, body = %mail.body, "undelivered mail");
        Ok(())
    }
}
