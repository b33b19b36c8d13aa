//! Worker execution primitives shared by the emulator launcher.
//!
//! Everything that blocks for an unbounded duration runs on a dedicated OS
//! thread spawned through this crate, so thread naming, stack sizing and
//! tracing metadata stay uniform across callers.

mod class;
mod panic;
mod spawn;

pub use class::TaskClass;
pub use panic::panic_message;
pub use spawn::{ThreadSpec, spawn_named_thread};
