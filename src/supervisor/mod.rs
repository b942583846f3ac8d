//! Supervision of headless Claude Code invocations.

mod relay;
mod runner;
mod state;

pub use relay::*;
pub use runner::*;
pub use state::*;
