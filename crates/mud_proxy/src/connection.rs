//! One task per player connection.
//!
//! The task reads lines from the client and writes whatever arrives on the
//! session's channel. Until login, lines go to the [`Shell`]; afterwards they
//! are sent to the world one at a time, each waiting for the world's reply
//! before the next is read.

use std::net::SocketAddr;
use std::sync::Arc;

use mud_entity::{EntityId, ErrorKind};
use mud_net::NetError;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::account::{Account, AccountStore};
use crate::link::WorldLink;
use crate::mail::Mailer;
use crate::manager::SessionManager;
use crate::session::{SessionEvent, SessionId};
use crate::shell::{Shell, ShellOutcome, USERNAME_PROMPT};

pub const WORLD_UNAVAILABLE: &str =
    "The world is not responding right now. Please try again in a moment.";
pub const CRITICAL_ERROR: &str = "A critical error has occurred.";
pub const INVALID_UTF8: &str = "That input was not valid UTF-8 and was ignored.";
pub const LINE_TOO_LONG: &str = "That line is too long. Goodbye.";
pub const CHARACTER_LOST: &str = "Your character no longer exists.";

/// Services shared by every connection.
#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub manager: Arc<SessionManager>,
    pub accounts: Arc<AccountStore>,
    pub mailer: Arc<dyn Mailer>,
    pub world: Arc<dyn WorldLink>,
    pub max_line_len: usize,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Close,
}

enum ReadEvent {
    Line(Vec<u8>),
    TooLong,
    Eof,
}

/// Serve one client until it disconnects or its session is closed.
pub async fn handle_connection<S>(stream: S, peer: SocketAddr, ctx: ProxyContext)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);
    let (tx, mut rx) = mpsc::unbounded_channel();
    let id = ctx.manager.add(peer, tx);
    info!(session = %id, %peer, "connection opened");

    let mut conn = Connection {
        id,
        ctx: ctx.clone(),
        shell: Shell::new(),
        entity: None,
    };
    for line in Shell::greeting() {
        conn.send(line);
    }

    let mut buf = Vec::new();
    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(SessionEvent::Line(text)) => {
                    if let Err(err) = write_line(&mut writer, &text).await {
                        debug!(session = %id, error = %err, "write failed");
                        break;
                    }
                }
                Some(SessionEvent::Close) | None => break,
            },
            read = next_line(&mut reader, &mut buf, ctx.max_line_len) => match read {
                Ok(ReadEvent::Line(bytes)) => {
                    let flow = match String::from_utf8(bytes) {
                        Ok(line) => conn.on_line(&line).await,
                        Err(_) => {
                            ctx.manager.touch(id, false);
                            conn.send(INVALID_UTF8);
                            Flow::Continue
                        }
                    };
                    if flow == Flow::Close {
                        // Queued behind any pending output.
                        ctx.manager.with_session(id, |s| s.close());
                    }
                }
                Ok(ReadEvent::TooLong) => {
                    warn!(session = %id, limit = ctx.max_line_len, "line too long");
                    let _ = write_line(&mut writer, LINE_TOO_LONG).await;
                    break;
                }
                Ok(ReadEvent::Eof) => break,
                Err(err) => {
                    debug!(session = %id, error = %err, "read failed");
                    break;
                }
            },
        }
    }

    let _ = writer.shutdown().await;
    let _gate = match ctx.manager.entity_of(id) {
        Some(entity) => Some(ctx.manager.presence_gate(entity).await),
        None => None,
    };
    if let Some(entity) = ctx.manager.remove(id)
        && let Err(err) = ctx.world.last_session_disconnected(entity).await
    {
        warn!(session = %id, entity = %entity, error = %err, "could not notify world of disconnect");
    }
    info!(session = %id, "connection closed");
}

struct Connection {
    id: SessionId,
    ctx: ProxyContext,
    shell: Shell,
    /// Set once logged in.
    entity: Option<EntityId>,
}

impl Connection {
    fn send(&self, text: impl Into<String>) {
        self.ctx.manager.send(self.id, text);
    }

    fn accounts(&self) -> &AccountStore {
        &self.ctx.accounts
    }

    async fn on_line(&mut self, line: &str) -> Flow {
        let Some(entity) = self.entity else {
            self.ctx.manager.touch(self.id, false);
            return self.shell_line(line).await;
        };
        if line.trim().is_empty() {
            self.ctx.manager.touch(self.id, false);
            return Flow::Continue;
        }
        self.ctx.manager.touch(self.id, true);
        self.world_line(entity, line).await
    }

    async fn shell_line(&mut self, line: &str) -> Flow {
        let outcome = self
            .shell
            .handle(&self.ctx.accounts, self.ctx.mailer.as_ref(), line)
            .await;
        match outcome {
            Ok(ShellOutcome::Continue(lines)) => {
                for line in lines {
                    self.send(line);
                }
                Flow::Continue
            }
            Ok(ShellOutcome::LoggedIn(account)) => self.log_in(account).await,
            Ok(ShellOutcome::AccountCreated { account, lines }) => {
                for line in lines {
                    self.send(line);
                }
                // The entity can also be created at first login.
                match self.ctx.world.create_entity_for_account(&account.username).await {
                    Ok(entity) => self.remember_entity(&account.username, entity).await,
                    Err(err) => {
                        debug!(account = %account.username, error = %err, "entity creation deferred");
                    }
                }
                Flow::Close
            }
            Err(err) => {
                error!(session = %self.id, error = %err, "login shell failed");
                self.shell.reset();
                self.send(CRITICAL_ERROR);
                self.send(USERNAME_PROMPT);
                Flow::Continue
            }
        }
    }

    async fn remember_entity(&self, username: &str, entity: EntityId) {
        if let Err(err) = self.accounts().bind_entity(username, entity).await {
            error!(account = username, entity = %entity, error = %err, "could not record entity");
        }
    }

    async fn log_in(&mut self, account: Account) -> Flow {
        let entity = match account.entity {
            Some(entity) => entity,
            None => match self.create_entity(&account.username).await {
                Some(entity) => entity,
                None => return Flow::Continue,
            },
        };
        self.bind(&account.username, entity).await
    }

    async fn create_entity(&mut self, username: &str) -> Option<EntityId> {
        match self.ctx.world.create_entity_for_account(username).await {
            Ok(entity) => {
                self.remember_entity(username, entity).await;
                Some(entity)
            }
            Err(err) => {
                self.report(&err);
                self.shell.reset();
                self.send(USERNAME_PROMPT);
                None
            }
        }
    }

    async fn bind(&mut self, username: &str, entity: EntityId) -> Flow {
        let manager = Arc::clone(&self.ctx.manager);
        let _gate = manager.presence_gate(entity).await;
        let Some(first) = manager.bind(self.id, username, entity) else {
            return Flow::Close;
        };
        self.entity = Some(entity);
        self.send(format!("Logged in as {username}."));
        if !first {
            return Flow::Continue;
        }

        match self.ctx.world.first_session_connected(entity).await {
            Ok(()) => Flow::Continue,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // The stored entity is gone; the world makes a fresh one.
                warn!(account = username, entity = %entity, "bound entity missing, recreating");
                let Some(fresh) = self.create_entity(username).await else {
                    self.entity = None;
                    return Flow::Close;
                };
                let _fresh_gate = if fresh == entity {
                    None
                } else {
                    Some(manager.presence_gate(fresh).await)
                };
                manager.bind(self.id, username, fresh);
                self.entity = Some(fresh);
                if let Err(err) = self.ctx.world.first_session_connected(fresh).await {
                    self.report(&err);
                }
                Flow::Continue
            }
            Err(err) => {
                self.report(&err);
                Flow::Continue
            }
        }
    }

    async fn world_line(&mut self, entity: EntityId, line: &str) -> Flow {
        match self.ctx.world.send_input(entity, line).await {
            Ok(()) => Flow::Continue,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!(session = %self.id, entity = %entity, "controlled entity is gone");
                self.send(CHARACTER_LOST);
                Flow::Close
            }
            Err(err) => {
                self.report(&err);
                Flow::Continue
            }
        }
    }

    fn report(&self, err: &NetError) {
        if err.is_unreachable() {
            debug!(session = %self.id, error = %err, "world unreachable");
            self.send(WORLD_UNAVAILABLE);
        } else {
            error!(session = %self.id, error = %err, "world call failed");
            self.send(CRITICAL_ERROR);
        }
    }
}

/// Append to `buf` until it holds a full line. `buf` survives cancellation,
/// so a partially read line is picked up by the next call.
async fn next_line<R>(reader: &mut R, buf: &mut Vec<u8>, max: usize) -> std::io::Result<ReadEvent>
where
    R: AsyncBufRead + Unpin,
{
    // Room for the line plus CRLF, and one byte to detect overflow.
    let budget = (max + 3).saturating_sub(buf.len()) as u64;
    let n = AsyncReadExt::take(&mut *reader, budget)
        .read_until(b'\n', buf)
        .await?;

    if buf.ends_with(b"\n") {
        let mut line = std::mem::take(buf);
        line.pop();
        if line.ends_with(b"\r") {
            line.pop();
        }
        if line.len() > max {
            return Ok(ReadEvent::TooLong);
        }
        return Ok(ReadEvent::Line(line));
    }
    if buf.len() > max + 2 {
        buf.clear();
        return Ok(ReadEvent::TooLong);
    }
    if n == 0 {
        buf.clear();
        return Ok(ReadEvent::Eof);
    }
    // Unterminated last line before EOF.
    let mut line = std::mem::take(buf);
    if line.ends_with(b"\r") {
        line.pop();
    }
    Ok(ReadEvent::Line(line))
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> std::io::Result<()> {
    let text = text.replace('\n', "\r\n");
    writer.write_all(text.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::DuplexStream;
    use tokio::sync::Semaphore;

    use super::*;
    use crate::shell::PASSWORD_PROMPT;
    use crate::testing::{MockWorld, context};

    struct Client {
        lines: tokio::io::Lines<BufReader<tokio::io::ReadHalf<DuplexStream>>>,
        writer: tokio::io::WriteHalf<DuplexStream>,
    }

    impl Client {
        fn connect(ctx: ProxyContext) -> (Self, tokio::task::JoinHandle<()>) {
            let (client, server) = tokio::io::duplex(1024);
            let task = tokio::spawn(handle_connection(
                server,
                "127.0.0.1:5000".parse().unwrap(),
                ctx,
            ));
            let (read, writer) = tokio::io::split(client);
            (
                Self {
                    lines: BufReader::new(read).lines(),
                    writer,
                },
                task,
            )
        }

        async fn send(&mut self, bytes: &[u8]) {
            self.writer.write_all(bytes).await.unwrap();
        }

        /// Read lines until one equals `wanted`.
        async fn expect(&mut self, wanted: &str) {
            tokio::time::timeout(Duration::from_secs(5), async {
                loop {
                    let line = self.lines.next_line().await.unwrap().unwrap();
                    if line == wanted {
                        return;
                    }
                }
            })
            .await
            .unwrap();
        }
    }

    #[tokio::test]
    async fn test_login_routes_input_and_reports_last_disconnect() {
        let world = Arc::new(MockWorld::default());
        let ctx = context(world.clone()).await;
        let manager = ctx.manager.clone();
        let (mut client, task) = Client::connect(ctx);

        client.expect(USERNAME_PROMPT).await;
        client.send(b"dave\r\n").await;
        client.expect(PASSWORD_PROMPT).await;
        client.send(b"letmein\r\n").await;
        client.expect("Logged in as dave.").await;
        client.send(b"look\n").await;
        client.send(b"\xff\xfe\n").await;
        client.expect(INVALID_UTF8).await;
        assert_eq!(manager.who()[0].entity_id, Some(EntityId(9)));

        drop(client);
        task.await.unwrap();
        let calls = world.calls();
        assert_eq!(
            calls,
            vec!["create dave", "first #9", "input #9 look", "last #9"]
        );
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_world_keeps_connection() {
        let world = Arc::new(MockWorld {
            unreachable: true,
            ..MockWorld::default()
        });
        let ctx = context(world.clone()).await;
        let (mut client, task) = Client::connect(ctx);

        client.send(b"dave\nletmein\n").await;
        client.expect("Logged in as dave.").await;
        client.send(b"say hi\n").await;
        client.expect(WORLD_UNAVAILABLE).await;
        client.send(b"say again\n").await;
        client.expect(WORLD_UNAVAILABLE).await;

        drop(client);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_closed_session_ends_connection() {
        let world = Arc::new(MockWorld::default());
        let ctx = context(world.clone()).await;
        let manager = ctx.manager.clone();
        let (mut client, task) = Client::connect(ctx);

        client.send(b"dave\nletmein\n").await;
        client.expect("Logged in as dave.").await;
        assert_eq!(manager.disconnect_entity(EntityId(9)), 1);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert!(world.calls().contains(&"last #9".to_string()));
    }

    #[tokio::test]
    async fn test_relogin_waits_for_pending_disconnect() {
        let hold = Arc::new(Semaphore::new(0));
        let world = Arc::new(MockWorld {
            hold_last: Some(hold.clone()),
            ..MockWorld::default()
        });
        let ctx = context(world.clone()).await;
        let manager = ctx.manager.clone();

        let (mut old, old_task) = Client::connect(ctx.clone());
        old.send(b"dave\nletmein\n").await;
        old.expect("Logged in as dave.").await;
        drop(old);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !manager.is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let (mut new, new_task) = Client::connect(ctx);
        new.send(b"dave\nletmein\n").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(world.calls(), vec!["create dave", "first #9"]);

        hold.add_permits(1);
        new.expect("Logged in as dave.").await;
        old_task.await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while world.calls().len() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(
            world.calls(),
            vec!["create dave", "first #9", "last #9", "first #9"]
        );

        hold.add_permits(1);
        drop(new);
        new_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_overlong_line_disconnects() {
        let world = Arc::new(MockWorld::default());
        let ctx = context(world).await;
        let (mut client, task) = Client::connect(ctx);

        client.send(&[b'a'; 200]).await;
        client.expect(LINE_TOO_LONG).await;
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
