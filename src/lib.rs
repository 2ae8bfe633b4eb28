//! Minimal FTP-style file transfer
//!
//! A long-lived control connection carries single-letter commands and their
//! responses; every command that moves file bytes negotiates a one-shot data
//! connection first.

pub mod cli;
pub mod client;
pub mod data_channel;
pub mod exec;
pub mod frame;
pub mod logger;
pub mod protocol;
pub mod session;
pub mod transfer;
