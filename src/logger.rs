//! Session event logging for the daemon

use chrono::Utc;

/// Sink for per-session events. Every session-recoverable error is surfaced
/// here as well as in the `E` response sent to the peer.
pub trait Logger: Send + Sync {
    fn connected(&self, _peer: &str) {}
    fn command(&self, _peer: &str, _what: &str) {}
    fn error(&self, _peer: &str, _msg: &str) {}
    fn closed(&self, _peer: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Timestamped line-per-event logger on the daemon's standard error.
pub struct StderrLogger;

impl StderrLogger {
    fn line(&self, s: &str) {
        eprintln!("[{}] {}", Utc::now().to_rfc3339(), s);
    }
}

impl Logger for StderrLogger {
    fn connected(&self, peer: &str) {
        self.line(&format!("CONNECT peer={peer}"));
    }
    fn command(&self, peer: &str, what: &str) {
        self.line(&format!("OK peer={peer} {what}"));
    }
    fn error(&self, peer: &str, msg: &str) {
        self.line(&format!("ERROR peer={peer} msg={msg}"));
    }
    fn closed(&self, peer: &str) {
        self.line(&format!("CLOSE peer={peer}"));
    }
}
