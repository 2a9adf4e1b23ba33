//! CLI commands.

pub mod check;
pub mod deploy;
pub mod gc;
pub mod info;
pub mod init;
pub mod resolve;
pub mod verify;
