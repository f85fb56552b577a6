//! The login and registration dialogue run before a session is bound.
//!
//! States and their exits:
//!
//! - `GetUsername`: a known name asks for its password, a new valid name
//!   asks for confirmation.
//! - `GetExistingPassword`: success logs in, failure returns to the username.
//! - `ConfirmNewUsername`: yes asks for an email, no returns to the username.
//! - `GetEmail1` then `GetEmail2`: a mismatch starts the email over; a match
//!   creates the account, mails its password and ends the session.
//!
//! Each line either advances exactly one state or re-prompts in place.

use tracing::{error, info};

use crate::account::{Account, AccountStore, generate_password, validate_email, validate_username};
use crate::error::{AccountError, ProxyError};
use crate::mail::{Mail, Mailer};

pub const GREETING: &str = "Welcome! Enter your username, or pick a new one to register.";
pub const USERNAME_PROMPT: &str = "Username:";
pub const PASSWORD_PROMPT: &str = "Password:";
pub const EMAIL_PROMPT: &str = "Email address:";
pub const EMAIL_CONFIRM_PROMPT: &str = "Confirm email address:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellState {
    GetUsername,
    GetExistingPassword { username: String },
    ConfirmNewUsername { username: String },
    GetEmail1 { username: String },
    GetEmail2 { username: String, email: String },
}

#[derive(Debug)]
pub enum ShellOutcome {
    /// Still in the shell; show these lines.
    Continue(Vec<String>),
    /// Credentials checked out.
    LoggedIn(Account),
    /// A new account exists and its password is on its way. The session
    /// should show `lines` and disconnect.
    AccountCreated { account: Account, lines: Vec<String> },
}

fn lines<const N: usize>(items: [&str; N]) -> ShellOutcome {
    ShellOutcome::Continue(items.iter().map(|s| (*s).to_string()).collect())
}

#[derive(Debug)]
pub struct Shell {
    state: ShellState,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ShellState::GetUsername,
        }
    }

    #[must_use]
    pub fn state(&self) -> &ShellState {
        &self.state
    }

    /// Lines shown when a connection opens.
    #[must_use]
    pub fn greeting() -> Vec<String> {
        vec![GREETING.to_string(), USERNAME_PROMPT.to_string()]
    }

    /// Back to the username prompt.
    pub fn reset(&mut self) {
        self.state = ShellState::GetUsername;
    }

    /// Feed one line of input.
    ///
    /// # Errors
    ///
    /// Returns storage or hashing failures; the shell is reset to the
    /// username prompt first.
    pub async fn handle(
        &mut self,
        accounts: &AccountStore,
        mailer: &dyn Mailer,
        line: &str,
    ) -> Result<ShellOutcome, ProxyError> {
        let input = line.trim();
        let state = std::mem::replace(&mut self.state, ShellState::GetUsername);
        let (next, outcome) = match state {
            ShellState::GetUsername => Self::get_username(accounts, input).await,
            ShellState::GetExistingPassword { username } => {
                match accounts.authenticate(&username, input).await {
                    Ok(account) => {
                        info!(account = %account.username, "logged in");
                        (ShellState::GetUsername, ShellOutcome::LoggedIn(account))
                    }
                    Err(AccountError::InvalidCredentials) => (
                        ShellState::GetUsername,
                        lines(["Invalid username or password.", USERNAME_PROMPT]),
                    ),
                    Err(err) => return Err(err.into()),
                }
            }
            ShellState::ConfirmNewUsername { username } => {
                match input.to_ascii_lowercase().as_str() {
                    "y" | "yes" => (ShellState::GetEmail1 { username }, lines([EMAIL_PROMPT])),
                    "n" | "no" => (ShellState::GetUsername, lines([USERNAME_PROMPT])),
                    _ => {
                        let prompt = format!("Create a new account named {username}? (yes/no)");
                        (
                            ShellState::ConfirmNewUsername { username },
                            ShellOutcome::Continue(vec![prompt]),
                        )
                    }
                }
            }
            ShellState::GetEmail1 { username } => match validate_email(input) {
                Ok(()) => (
                    ShellState::GetEmail2 {
                        username,
                        email: input.to_string(),
                    },
                    lines([EMAIL_CONFIRM_PROMPT]),
                ),
                Err(_) => (
                    ShellState::GetEmail1 { username },
                    lines(["That doesn't look like an email address.", EMAIL_PROMPT]),
                ),
            },
            ShellState::GetEmail2 { username, email } => {
                if input != email {
                    (
                        ShellState::GetEmail1 { username },
                        lines(["The addresses don't match.", EMAIL_PROMPT]),
                    )
                } else {
                    Self::create(accounts, mailer, &username, &email).await?
                }
            }
        };
        self.state = next;
        Ok(outcome)
    }

    async fn get_username(accounts: &AccountStore, input: &str) -> (ShellState, ShellOutcome) {
        if input.is_empty() {
            return (ShellState::GetUsername, lines([USERNAME_PROMPT]));
        }
        if accounts.exists(input).await {
            return (
                ShellState::GetExistingPassword {
                    username: input.to_string(),
                },
                lines([PASSWORD_PROMPT]),
            );
        }
        if validate_username(input).is_err() {
            return (
                ShellState::GetUsername,
                lines([
                    "Usernames are 3 to 20 letters, digits or underscores, starting with a letter.",
                    USERNAME_PROMPT,
                ]),
            );
        }
        let prompt = format!("There is no account named {input}. Create it? (yes/no)");
        (
            ShellState::ConfirmNewUsername {
                username: input.to_string(),
            },
            ShellOutcome::Continue(vec![prompt]),
        )
    }

    async fn create(
        accounts: &AccountStore,
        mailer: &dyn Mailer,
        username: &str,
        email: &str,
    ) -> Result<(ShellState, ShellOutcome), ProxyError> {
        let password = generate_password();
        let account = match accounts.create_account(username, &password, email).await {
            Ok(account) => account,
            Err(AccountError::UsernameTaken(_)) => {
                return Ok((
                    ShellState::GetUsername,
                    lines(["Someone just took that username.", USERNAME_PROMPT]),
                ));
            }
            Err(err) => return Err(err.into()),
        };

        let notice = match mailer
            .send(&Mail::new_account(&account.username, email, &password))
            .await
        {
            Ok(()) => format!("Your account is ready. Your password has been sent to {email}."),
            Err(err) => {
                error!(account = %account.username, error = %err, "could not deliver password");
                "Your account is ready, but the password could not be sent. Please contact an administrator."
                    .to_string()
            }
        };
        Ok((
            ShellState::GetUsername,
            ShellOutcome::AccountCreated {
                account,
                lines: vec![notice, "Reconnect and log in with your new password.".to_string()],
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::account::test_hasher;

    #[derive(Debug, Default)]
    struct Outbox {
        sent: Mutex<Vec<Mail>>,
    }

    #[async_trait]
    impl Mailer for Outbox {
        async fn send(&self, mail: &Mail) -> Result<(), ProxyError> {
            self.sent.lock().unwrap().push(mail.clone());
            Ok(())
        }
    }

    fn shown(outcome: &ShellOutcome) -> Vec<String> {
        match outcome {
            ShellOutcome::Continue(lines) | ShellOutcome::AccountCreated { lines, .. } => {
                lines.clone()
            }
            ShellOutcome::LoggedIn(_) => Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_registration_walkthrough() {
        let accounts = AccountStore::in_memory(test_hasher());
        let mailer = Outbox::default();
        let mut shell = Shell::new();

        let out = shell.handle(&accounts, &mailer, "Carol").await.unwrap();
        assert!(shown(&out)[0].contains("Create it?"));
        assert!(matches!(shell.state(), ShellState::ConfirmNewUsername { .. }));

        shell.handle(&accounts, &mailer, "maybe").await.unwrap();
        assert!(matches!(shell.state(), ShellState::ConfirmNewUsername { .. }));

        shell.handle(&accounts, &mailer, "yes").await.unwrap();
        assert!(matches!(shell.state(), ShellState::GetEmail1 { .. }));

        let out = shell.handle(&accounts, &mailer, "nope").await.unwrap();
        assert_eq!(shown(&out)[1], EMAIL_PROMPT);
        assert!(matches!(shell.state(), ShellState::GetEmail1 { .. }));

        shell.handle(&accounts, &mailer, "c@x.com").await.unwrap();
        let out = shell.handle(&accounts, &mailer, "c@y.com").await.unwrap();
        assert_eq!(shown(&out)[0], "The addresses don't match.");
        assert!(matches!(shell.state(), ShellState::GetEmail1 { .. }));

        shell.handle(&accounts, &mailer, "c@x.com").await.unwrap();
        let out = shell.handle(&accounts, &mailer, "c@x.com").await.unwrap();
        let ShellOutcome::AccountCreated { account, .. } = out else {
            panic!("expected account creation");
        };
        assert_eq!(account.username, "Carol");
        assert_eq!(shell.state(), &ShellState::GetUsername);

        let sent = mailer.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "c@x.com");
        let password = sent[0]
            .body
            .lines()
            .find_map(|l| l.strip_prefix("Your password is: "))
            .unwrap()
            .to_string();
        assert!(accounts.authenticate("carol", &password).await.is_ok());
    }

    #[tokio::test]
    async fn test_login_and_failed_password() {
        let accounts = AccountStore::in_memory(test_hasher());
        accounts
            .create_account("dave", "letmein", "d@x.com")
            .await
            .unwrap();
        let mailer = Outbox::default();
        let mut shell = Shell::new();

        let out = shell.handle(&accounts, &mailer, "DAVE").await.unwrap();
        assert_eq!(shown(&out), vec![PASSWORD_PROMPT]);
        let out = shell.handle(&accounts, &mailer, "wrong").await.unwrap();
        assert_eq!(shown(&out)[0], "Invalid username or password.");
        assert_eq!(shell.state(), &ShellState::GetUsername);

        shell.handle(&accounts, &mailer, "dave").await.unwrap();
        let out = shell.handle(&accounts, &mailer, "letmein").await.unwrap();
        assert!(matches!(out, ShellOutcome::LoggedIn(ref a) if a.username == "dave"));
    }

    #[tokio::test]
    async fn test_invalid_or_empty_username_stays_put() {
        let accounts = AccountStore::in_memory(test_hasher());
        let mailer = Outbox::default();
        let mut shell = Shell::new();

        let out = shell.handle(&accounts, &mailer, "   ").await.unwrap();
        assert_eq!(shown(&out), vec![USERNAME_PROMPT]);
        shell.handle(&accounts, &mailer, "9lives").await.unwrap();
        assert_eq!(shell.state(), &ShellState::GetUsername);

        shell.handle(&accounts, &mailer, "erin").await.unwrap();
        shell.handle(&accounts, &mailer, "no").await.unwrap();
        assert_eq!(shell.state(), &ShellState::GetUsername);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
