//! Server side: connection supervisor and per-session state machine
//!
//! One detached task per accepted control connection; sessions share no
//! mutable state. The working directory and the pending data channel are
//! explicit per-session fields, never process-wide.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};

use crate::data_channel::DataChannel;
use crate::exec;
use crate::frame::{self, Command, Line, Response};
use crate::logger::Logger;
use crate::protocol::{MAX_COMMAND_LINE, MAX_RESPONSE_LINE};
use crate::transfer;

/// Accept control connections forever. Failure to bind or accept the
/// well-known listener is fatal to the whole daemon; everything that goes
/// wrong inside a session terminates only that session's task.
pub async fn serve(bind: &str, root: &Path, logger: Arc<dyn Logger>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("canonicalize root {}", root.display()))?;
    loop {
        let (stream, peer) = listener
            .accept()
            .await
            .context("accept control connection")?;
        logger.connected(&peer.to_string());
        let session = Session::new(stream, peer, root.clone(), Arc::clone(&logger));
        let log = Arc::clone(&logger);
        tokio::spawn(async move {
            if let Err(e) = session.run().await {
                log.error(&peer.to_string(), &format!("session ended: {e:#}"));
            }
        });
    }
}

/// State for one control connection. Lives exactly as long as the session:
/// from accept until quit or the control channel closing.
pub struct Session {
    control: BufReader<TcpStream>,
    peer: String,
    cwd: PathBuf,
    pending: Option<DataChannel>,
    logger: Arc<dyn Logger>,
}

impl Session {
    pub fn new(stream: TcpStream, peer: SocketAddr, cwd: PathBuf, logger: Arc<dyn Logger>) -> Self {
        Self {
            control: BufReader::new(stream),
            peer: peer.to_string(),
            cwd,
            pending: None,
            logger,
        }
    }

    /// Run the session to completion: one command per iteration until quit
    /// or end-of-stream on the control connection.
    pub async fn run(mut self) -> Result<()> {
        loop {
            let bytes = match frame::read_line(&mut self.control, MAX_COMMAND_LINE).await? {
                Line::Eof => break,
                Line::Truncated(bytes) => {
                    frame::discard_through_newline(&mut self.control).await?;
                    self.reject(format!(
                        "Invalid input {}",
                        String::from_utf8_lossy(&bytes)
                    ))
                    .await?;
                    continue;
                }
                Line::Complete(bytes) => bytes,
            };
            let cmd = match Command::parse(&bytes) {
                Ok(cmd) => cmd,
                Err(e) => {
                    self.reject(e.to_string()).await?;
                    continue;
                }
            };
            match cmd {
                Command::OpenDataChannel => self.open_data_channel().await?,
                Command::ChangeDir(path) => self.change_dir(&path).await?,
                Command::List => self.send_listing().await?,
                Command::Get(name) => self.send_file(&name).await?,
                Command::Put(name) => self.receive_file(&name).await?,
                Command::Quit => {
                    self.respond(&Response::ack()).await?;
                    self.logger.command(&self.peer, "closing connection");
                    break;
                }
            }
        }
        self.logger.closed(&self.peer);
        Ok(())
    }

    async fn respond(&mut self, resp: &Response) -> Result<()> {
        frame::write_line(self.control.get_mut(), &resp.encode()).await
    }

    /// Send a session-recoverable error to the peer and log it; the session
    /// loop continues afterwards.
    async fn reject(&mut self, mut msg: String) -> Result<()> {
        // Responses share the line cap; over-long diagnostics (echoes of a
        // truncated command, say) must still fit one response line.
        let max = MAX_RESPONSE_LINE - 2;
        if msg.len() > max {
            let mut cut = max;
            while !msg.is_char_boundary(cut) {
                cut -= 1;
            }
            msg.truncate(cut);
        }
        self.logger.error(&self.peer, &msg);
        self.respond(&Response::error(msg)).await
    }

    /// Resolve a peer-supplied path against the session working directory.
    fn resolve(&self, name: &str) -> PathBuf {
        self.cwd.join(name)
    }

    /// Consume the pending data channel, accepting its single connection.
    /// Returns `None` (after a typed error response) when no channel was
    /// negotiated first.
    async fn take_accepted(&mut self) -> Result<Option<TcpStream>> {
        match self.pending.take() {
            Some(channel) => Ok(Some(channel.accept().await?)),
            None => {
                self.reject("no data channel established".into()).await?;
                Ok(None)
            }
        }
    }

    async fn open_data_channel(&mut self) -> Result<()> {
        // Replacing an unconsumed channel drops the orphaned listener.
        let channel = DataChannel::bind().await?;
        let port = channel.port();
        self.pending = Some(channel);
        self.respond(&Response::ack_port(port)).await?;
        self.logger
            .command(&self.peer, &format!("data channel listening on {port}"));
        Ok(())
    }

    async fn change_dir(&mut self, path: &str) -> Result<()> {
        let resolved = match tokio::fs::canonicalize(self.resolve(path)).await {
            Ok(dir) => dir,
            Err(_) => return self.reject(format!("Invalid pathname {path}")).await,
        };
        let is_dir = tokio::fs::metadata(&resolved)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return self.reject(format!("Invalid pathname {path}")).await;
        }
        self.cwd = resolved;
        self.respond(&Response::ack()).await?;
        self.logger.command(
            &self.peer,
            &format!("changed working directory to {}", self.cwd.display()),
        );
        Ok(())
    }

    async fn send_listing(&mut self) -> Result<()> {
        let Some(mut data) = self.take_accepted().await? else {
            return Ok(());
        };
        // The listing helper streams into the accepted connection while this
        // session waits; the acknowledge goes out only once it completes.
        exec::stream_listing(&self.cwd, &mut data).await?;
        drop(data);
        self.respond(&Response::ack()).await?;
        self.logger.command(&self.peer, "sent directory listing");
        Ok(())
    }

    async fn send_file(&mut self, name: &str) -> Result<()> {
        let Some(mut data) = self.take_accepted().await? else {
            return Ok(());
        };
        let mut file = match transfer::open_existing(&self.resolve(name), name).await {
            Ok(f) => f,
            Err(msg) => {
                // Close the accepted connection with no bytes sent.
                drop(data);
                return self.reject(msg).await;
            }
        };
        self.respond(&Response::ack()).await?;
        transfer::copy_until_eof(&mut file, &mut data).await?;
        self.logger
            .command(&self.peer, &format!("sent contents of {name}"));
        Ok(())
    }

    async fn receive_file(&mut self, name: &str) -> Result<()> {
        let Some(mut data) = self.take_accepted().await? else {
            return Ok(());
        };
        let mut file = match transfer::create_exclusive(&self.resolve(name), name).await {
            Ok(f) => f,
            Err(msg) => {
                drop(data);
                return self.reject(msg).await;
            }
        };
        self.respond(&Response::ack()).await?;
        transfer::copy_until_eof(&mut data, &mut file).await?;
        transfer::restrict_to_owner(&file).await?;
        self.logger
            .command(&self.peer, &format!("received contents of {name}"));
        Ok(())
    }
}
