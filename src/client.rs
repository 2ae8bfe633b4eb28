//! Interactive client: prompt loop and the client half of the state machine

use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::data_channel;
use crate::exec;
use crate::frame::{self, Command, Line, Response};
use crate::protocol::MAX_RESPONSE_LINE;
use crate::transfer;

/// One line typed at the prompt, tokenized on whitespace. These are the
/// user-facing commands; only some of them produce wire traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    Exit,
    CdLocal(String),
    CdRemote(String),
    ListLocal,
    ListRemote,
    Get(String),
    Show(String),
    Put(String),
}

fn required(token: Option<&str>, cmd: &str) -> Result<String, String> {
    token
        .map(str::to_string)
        .ok_or_else(|| format!("{cmd} requires a pathname"))
}

impl UserCommand {
    /// Parse one prompt line. Errors are display text for the user; the
    /// prompt loop continues after printing them.
    pub fn parse(line: &str) -> Result<UserCommand, String> {
        let mut tokens = line.split_whitespace();
        let Some(word) = tokens.next() else {
            return Err("No input detected".into());
        };
        match word {
            "exit" => Ok(UserCommand::Exit),
            "cd" => required(tokens.next(), "cd").map(UserCommand::CdLocal),
            "rcd" => required(tokens.next(), "rcd").map(UserCommand::CdRemote),
            "ls" => Ok(UserCommand::ListLocal),
            "rls" => Ok(UserCommand::ListRemote),
            "get" => required(tokens.next(), "get").map(UserCommand::Get),
            "show" => required(tokens.next(), "show").map(UserCommand::Show),
            "put" => required(tokens.next(), "put").map(UserCommand::Put),
            other => Err(format!("Invalid input ({other})")),
        }
    }
}

/// The client half of a control session: the single long-lived connection
/// plus the hostname data channels are opened against.
pub struct ClientSession {
    control: BufReader<TcpStream>,
    host: String,
}

impl ClientSession {
    /// Open the control connection. Resolution or connect failure is fatal
    /// to the whole client process.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("connect to {host}:{port}"))?;
        println!("Connection established on port {port}");
        Ok(Self {
            control: BufReader::new(stream),
            host: host.to_string(),
        })
    }

    async fn send(&mut self, cmd: &Command) -> Result<()> {
        frame::write_line(self.control.get_mut(), &cmd.encode()).await
    }

    async fn read_response(&mut self) -> Result<Response> {
        match frame::read_line(&mut self.control, MAX_RESPONSE_LINE).await? {
            Line::Eof => bail!("control connection closed by server"),
            Line::Truncated(_) => bail!("oversized response from server"),
            Line::Complete(bytes) => Response::parse(&bytes),
        }
    }

    /// Print a server error the way the original client did; returns true
    /// when the server acknowledged.
    fn report(resp: &Response) -> bool {
        match resp {
            Response::Ack(_) => true,
            Response::Error(msg) => {
                println!("SERVER: {msg}");
                false
            }
        }
    }

    /// Negotiate a data channel for `cmd`: request one with `D`, parse the
    /// advertised port, send `cmd`, then connect. No unrelated command may
    /// intervene between the request and the command that consumes it.
    async fn open_data_channel(&mut self, cmd: &Command) -> Result<TcpStream> {
        self.send(&Command::OpenDataChannel).await?;
        let port = self.read_response().await?.port()?;
        self.send(cmd).await?;
        data_channel::connect(&self.host, port).await
    }

    pub async fn quit(&mut self) -> Result<()> {
        self.send(&Command::Quit).await?;
        let resp = self.read_response().await?;
        Self::report(&resp);
        Ok(())
    }

    pub async fn dispatch(&mut self, cmd: UserCommand) -> Result<()> {
        match cmd {
            UserCommand::Exit => self.quit().await,
            UserCommand::CdLocal(path) => {
                if std::env::set_current_dir(&path).is_err() {
                    println!("ERROR: Invalid pathname ({path})");
                }
                Ok(())
            }
            UserCommand::CdRemote(path) => {
                self.send(&Command::ChangeDir(path)).await?;
                let resp = self.read_response().await?;
                Self::report(&resp);
                Ok(())
            }
            UserCommand::ListLocal => {
                let cwd = std::env::current_dir().context("query working directory")?;
                exec::page_listing(&cwd).await
            }
            UserCommand::ListRemote => self.list_remote().await,
            UserCommand::Get(name) => self.fetch(&name, false).await,
            UserCommand::Show(name) => self.fetch(&name, true).await,
            UserCommand::Put(name) => self.put(&name).await,
        }
    }

    async fn list_remote(&mut self) -> Result<()> {
        let mut data = self.open_data_channel(&Command::List).await?;
        // The server acknowledges only after the listing completes, so the
        // data channel must be drained before the control response is read.
        exec::page(&mut data).await?;
        drop(data);
        let resp = self.read_response().await?;
        Self::report(&resp);
        Ok(())
    }

    /// `get` persists the remote file under the same name; `show` pages it
    /// without persisting anything.
    async fn fetch(&mut self, name: &str, page_only: bool) -> Result<()> {
        let mut data = self
            .open_data_channel(&Command::Get(name.to_string()))
            .await?;
        let resp = self.read_response().await?;
        if !Self::report(&resp) {
            return Ok(());
        }
        if page_only {
            return exec::page(&mut data).await;
        }
        let mut file = match transfer::create_exclusive(Path::new(name), name).await {
            Ok(f) => f,
            Err(msg) => {
                println!("ERROR: {msg}");
                return Ok(());
            }
        };
        transfer::copy_until_eof(&mut data, &mut file).await?;
        transfer::restrict_to_owner(&file).await?;
        Ok(())
    }

    async fn put(&mut self, name: &str) -> Result<()> {
        // The local open comes first: a bad local path produces no wire
        // traffic at all.
        let mut file = match transfer::open_existing(Path::new(name), name).await {
            Ok(f) => f,
            Err(msg) => {
                println!("ERROR: {msg}");
                return Ok(());
            }
        };
        let mut data = self
            .open_data_channel(&Command::Put(name.to_string()))
            .await?;
        let resp = self.read_response().await?;
        if !Self::report(&resp) {
            return Ok(());
        }
        transfer::copy_until_eof(&mut file, &mut data).await?;
        data.shutdown().await.context("close data channel")?;
        Ok(())
    }
}

/// Interactive session loop: prompt, parse, dispatch, until `exit` or
/// end-of-stream on standard input.
pub async fn run(host: &str, port: u16) -> Result<()> {
    let mut session = ClientSession::connect(host, port).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::Write::flush(&mut std::io::stdout()).context("flush prompt")?;
        let Some(line) = lines.next_line().await.context("read prompt line")? else {
            break;
        };
        let cmd = match UserCommand::parse(&line) {
            Ok(cmd) => cmd,
            Err(msg) => {
                println!("ERROR: {msg}");
                continue;
            }
        };
        let is_exit = cmd == UserCommand::Exit;
        session.dispatch(cmd).await?;
        if is_exit {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_every_command() {
        assert_eq!(UserCommand::parse("exit"), Ok(UserCommand::Exit));
        assert_eq!(
            UserCommand::parse("cd /tmp"),
            Ok(UserCommand::CdLocal("/tmp".into()))
        );
        assert_eq!(
            UserCommand::parse("rcd docs"),
            Ok(UserCommand::CdRemote("docs".into()))
        );
        assert_eq!(UserCommand::parse("ls"), Ok(UserCommand::ListLocal));
        assert_eq!(UserCommand::parse("rls"), Ok(UserCommand::ListRemote));
        assert_eq!(
            UserCommand::parse("get a.txt"),
            Ok(UserCommand::Get("a.txt".into()))
        );
        assert_eq!(
            UserCommand::parse("show a.txt"),
            Ok(UserCommand::Show("a.txt".into()))
        );
        assert_eq!(
            UserCommand::parse("put a.txt"),
            Ok(UserCommand::Put("a.txt".into()))
        );
    }

    #[test]
    fn parse_tolerates_extra_whitespace() {
        assert_eq!(
            UserCommand::parse("  get \t a.txt "),
            Ok(UserCommand::Get("a.txt".into()))
        );
    }

    #[test]
    fn parse_rejects_empty_and_unknown_input() {
        assert_eq!(UserCommand::parse(""), Err("No input detected".into()));
        assert_eq!(UserCommand::parse("   "), Err("No input detected".into()));
        assert_eq!(
            UserCommand::parse("frobnicate"),
            Err("Invalid input (frobnicate)".into())
        );
    }

    #[test]
    fn parse_rejects_missing_pathname() {
        assert_eq!(UserCommand::parse("get"), Err("get requires a pathname".into()));
        assert_eq!(UserCommand::parse("put"), Err("put requires a pathname".into()));
        assert_eq!(UserCommand::parse("cd"), Err("cd requires a pathname".into()));
        assert_eq!(UserCommand::parse("rcd"), Err("rcd requires a pathname".into()));
        assert_eq!(UserCommand::parse("show"), Err("show requires a pathname".into()));
    }
}
