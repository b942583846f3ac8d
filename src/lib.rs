//! Claude Relay - Run Claude Code headlessly and relay its progress.

pub mod cli;
pub mod config;
pub mod conversation;
pub mod display;
pub mod session;
pub mod supervisor;
