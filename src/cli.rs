//! Clap option structs for the client and daemon binaries

use clap::Parser;
use std::path::PathBuf;

use crate::protocol::CONTROL_PORT;

/// Daemon options.
#[derive(Clone, Debug, Parser)]
#[command(name = "mftpd", about = "Minimal file-transfer daemon")]
pub struct DaemonOpts {
    /// Bind address (host:port)
    #[arg(long, default_value_t = format!("0.0.0.0:{CONTROL_PORT}"))]
    pub bind: String,

    /// Directory sessions start in
    #[arg(long, default_value = ".")]
    pub root: PathBuf,
}

/// Client options.
#[derive(Clone, Debug, Parser)]
#[command(name = "mftp", about = "Minimal file-transfer client")]
pub struct ClientOpts {
    /// Server hostname
    pub host: String,

    /// Server control port
    #[arg(long, default_value_t = CONTROL_PORT)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_binaries_default_to_the_well_known_port() {
        let daemon = DaemonOpts::parse_from(["mftpd"]);
        assert_eq!(daemon.bind, format!("0.0.0.0:{CONTROL_PORT}"));

        let client = ClientOpts::parse_from(["mftp", "example.com"]);
        assert_eq!(client.port, CONTROL_PORT);
    }
}
