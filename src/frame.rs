//! Line framing and command/response encoding for the control connection
//!
//! The wire format is a single opcode byte followed by an optional argument,
//! terminated by a newline. There is no escaping or length prefix; a line
//! that fills the cap without a newline is a framing fault.

use anyhow::{bail, Context, Result};
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{opcode, reply};

/// One framed line read off the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// Peer closed the connection before sending anything.
    Eof,
    /// A newline-terminated line, newline excluded. A partial line cut off by
    /// end-of-stream is reported the same way; the following read sees `Eof`.
    Complete(Vec<u8>),
    /// The cap filled before a newline arrived. Callers must treat this as a
    /// framing fault; the bytes read so far are returned for diagnostics.
    Truncated(Vec<u8>),
}

/// Read one line of at most `max_len` bytes from the control connection.
pub async fn read_line<R>(stream: &mut R, max_len: usize) -> Result<Line>
where
    R: AsyncBufRead + Unpin,
{
    let mut line: Vec<u8> = Vec::new();
    loop {
        let chunk = stream.fill_buf().await.context("read control line")?;
        if chunk.is_empty() {
            return Ok(if line.is_empty() {
                Line::Eof
            } else {
                Line::Complete(line)
            });
        }
        let room = max_len - line.len();
        if let Some(pos) = chunk.iter().take(room).position(|&b| b == b'\n') {
            line.extend_from_slice(&chunk[..pos]);
            stream.consume(pos + 1);
            return Ok(Line::Complete(line));
        }
        let take = chunk.len().min(room);
        line.extend_from_slice(&chunk[..take]);
        stream.consume(take);
        if line.len() >= max_len {
            return Ok(Line::Truncated(line));
        }
    }
}

/// Discard buffered input through the next newline (or end-of-stream) so the
/// session can resync on the command following a framing fault.
pub async fn discard_through_newline<R>(stream: &mut R) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let chunk = stream.fill_buf().await.context("resync control line")?;
        if chunk.is_empty() {
            return Ok(());
        }
        match chunk.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                stream.consume(pos + 1);
                return Ok(());
            }
            None => {
                let n = chunk.len();
                stream.consume(n);
            }
        }
    }
}

/// Write one encoded line (trailing newline included by the encoder) and
/// flush it; responses are never buffered across commands.
pub async fn write_line<W>(stream: &mut W, bytes: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    stream.write_all(bytes).await.context("write control line")?;
    stream.flush().await.context("flush control line")?;
    Ok(())
}

/// A parsed control command. Arguments are trimmed of surrounding whitespace,
/// so `G missing.txt` names the file `missing.txt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenDataChannel,
    ChangeDir(String),
    List,
    Get(String),
    Put(String),
    Quit,
}

/// Why a command line was rejected. The rendered message is sent back
/// verbatim in an `E` response; the session keeps running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    MissingArgument(char),
    Invalid(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::MissingArgument(op) => write!(f, "{op} requires an argument"),
            CommandError::Invalid(raw) => write!(f, "Invalid input {raw}"),
        }
    }
}

impl Command {
    pub fn parse(line: &[u8]) -> Result<Command, CommandError> {
        let Some((&op, rest)) = line.split_first() else {
            return Err(CommandError::Invalid(String::new()));
        };
        let arg = String::from_utf8_lossy(rest).trim().to_string();
        match op {
            opcode::DATA => Ok(Command::OpenDataChannel),
            opcode::LIST => Ok(Command::List),
            opcode::QUIT => Ok(Command::Quit),
            opcode::CHDIR | opcode::GET | opcode::PUT if arg.is_empty() => {
                Err(CommandError::MissingArgument(op as char))
            }
            opcode::CHDIR => Ok(Command::ChangeDir(arg)),
            opcode::GET => Ok(Command::Get(arg)),
            opcode::PUT => Ok(Command::Put(arg)),
            _ => Err(CommandError::Invalid(
                String::from_utf8_lossy(line).into_owned(),
            )),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Command::OpenDataChannel => out.push(opcode::DATA),
            Command::List => out.push(opcode::LIST),
            Command::Quit => out.push(opcode::QUIT),
            Command::ChangeDir(path) => {
                out.push(opcode::CHDIR);
                out.extend_from_slice(path.as_bytes());
            }
            Command::Get(name) => {
                out.push(opcode::GET);
                out.extend_from_slice(name.as_bytes());
            }
            Command::Put(name) => {
                out.push(opcode::PUT);
                out.extend_from_slice(name.as_bytes());
            }
        }
        out.push(b'\n');
        out
    }
}

/// A control response: acknowledge with an optional payload (currently only
/// a decimal port number), or an error carrying display text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack(Option<String>),
    Error(String),
}

impl Response {
    pub fn ack() -> Self {
        Response::Ack(None)
    }

    pub fn ack_port(port: u16) -> Self {
        Response::Ack(Some(port.to_string()))
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Response::Error(msg.into())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            Response::Ack(payload) => {
                out.push(reply::ACK);
                if let Some(p) = payload {
                    out.extend_from_slice(p.as_bytes());
                }
            }
            Response::Error(msg) => {
                out.push(reply::ERR);
                out.extend_from_slice(msg.as_bytes());
            }
        }
        out.push(b'\n');
        out
    }

    /// Parse a response line. A malformed response means the peer is not
    /// speaking this protocol, which is fatal to the client session.
    pub fn parse(line: &[u8]) -> Result<Response> {
        let Some((&tag, rest)) = line.split_first() else {
            bail!("empty response from server");
        };
        let text = String::from_utf8_lossy(rest).into_owned();
        match tag {
            reply::ACK => Ok(Response::Ack(if text.is_empty() {
                None
            } else {
                Some(text)
            })),
            reply::ERR => Ok(Response::Error(text)),
            other => bail!("unrecognized response tag {:?}", other as char),
        }
    }

    /// Extract the advertised data-channel port from an acknowledge payload.
    /// The port travels as the decimal rendering of the host-order value on
    /// both sides; no byte-order transformation is applied anywhere.
    pub fn port(&self) -> Result<u16> {
        match self {
            Response::Ack(Some(payload)) => payload
                .trim()
                .parse::<u16>()
                .with_context(|| format!("bad port payload {payload:?}")),
            Response::Ack(None) => bail!("acknowledge carried no port"),
            Response::Error(msg) => bail!("server error: {msg}"),
        }
    }
}
