//! Data-channel negotiation
//!
//! Every command that moves file bytes rides a short-lived connection
//! negotiated just before it: the server binds an ephemeral listener and
//! advertises the OS-assigned port on the control connection; the client
//! connects to it. The listener accepts exactly one connection and is then
//! gone, which `accept` enforces by consuming `self`.

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

/// A bound-but-not-yet-accepted data channel on the server side. A session
/// holds at most one of these; binding a replacement drops (and thereby
/// closes) the orphaned listener.
pub struct DataChannel {
    listener: TcpListener,
    port: u16,
}

impl DataChannel {
    /// Bind a fresh listener on an OS-assigned port, on the same wildcard
    /// address the control listener uses.
    pub async fn bind() -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", 0))
            .await
            .context("bind data channel listener")?;
        let port = listener
            .local_addr()
            .context("query data channel port")?
            .port();
        Ok(Self { listener, port })
    }

    /// The OS-assigned port, advertised to the client in host order as a
    /// decimal payload.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept the single inbound connection this channel exists for. The
    /// listener is dropped on return, so no second connection can sneak in.
    pub async fn accept(self) -> Result<TcpStream> {
        let (stream, _peer) = self
            .listener
            .accept()
            .await
            .context("accept data connection")?;
        Ok(stream)
    }
}

/// Client side: connect to the port the server advertised. The connection
/// becomes the data channel for the command just sent on the control line.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .with_context(|| format!("connect data channel to {host}:{port}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_reports_real_port_and_accepts_once() {
        let channel = DataChannel::bind().await.unwrap();
        let port = channel.port();
        assert_ne!(port, 0);

        let client = tokio::spawn(async move { connect("127.0.0.1", port).await });
        let server_side = channel.accept().await.unwrap();
        let client_side = client.await.unwrap().unwrap();

        assert_eq!(
            server_side.peer_addr().unwrap().port(),
            client_side.local_addr().unwrap().port()
        );
    }

    #[tokio::test]
    async fn repeated_binds_yield_distinct_ports() {
        let a = DataChannel::bind().await.unwrap();
        let b = DataChannel::bind().await.unwrap();
        assert_ne!(a.port(), b.port());
    }
}
