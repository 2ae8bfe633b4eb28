//! Shared wire constants for the mftp control connection

// Well-known control port the daemon listens on.
pub const CONTROL_PORT: u16 = 49999;

// Command lines are capped at 512 bytes, responses at 256 (a line that
// fills the cap without a newline is a framing fault, not a long argument).
pub const MAX_COMMAND_LINE: usize = 512;
pub const MAX_RESPONSE_LINE: usize = 256;

// Opcode bytes, one per control command (first byte of the line).
pub mod opcode {
    pub const DATA: u8 = b'D';
    pub const CHDIR: u8 = b'C';
    pub const LIST: u8 = b'L';
    pub const GET: u8 = b'G';
    pub const PUT: u8 = b'P';
    pub const QUIT: u8 = b'Q';
}

// Response tags (first byte of the reply line).
pub mod reply {
    pub const ACK: u8 = b'A';
    pub const ERR: u8 = b'E';
}
