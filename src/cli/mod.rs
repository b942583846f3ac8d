//! Claude Code process spawning and stream-json decoding.

mod events;
mod process;
mod stream;

pub use events::*;
pub use process::*;
pub use stream::*;
