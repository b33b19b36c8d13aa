//! In-process emulator launcher.
//!
//! A [`Launcher`] accumulates an ordered argument vector, then loads an
//! emulator from a dynamically loadable module, resolves its `main`-shaped
//! entry point and runs it on a dedicated worker thread. Completion is
//! reported exactly once, after the entry returns, either through a
//! [`LaunchHandle`] or a callback.
//!
//! The emulator shares the host's fault domain. Panics unwinding out of the
//! entry are caught and reported; crashes, `abort` and `exit` inside the
//! module take the whole process down.

/// Ordered argument accumulation and C `argv` marshalling.
pub mod args;
/// Launcher configuration.
pub mod config;
/// Out-of-band diagnostics reported by running emulators.
pub mod diagnostics;
/// Error types for launching.
pub mod error;
/// Launch orchestration, handles and lifecycle state.
pub mod launch;
/// Entry point resolution from loadable modules.
pub mod resolver;

pub use args::{ArgSnapshot, ArgVector, CArgv};
pub use config::{ConfigError, LaunchPolicy, LauncherConfig};
pub use error::{LaunchError, LaunchResult};
pub use launch::{LaunchHandle, LaunchMonitor, LaunchState, Launcher};
pub use resolver::{DylibResolver, EntryFn, ModuleResolver, ResolvedEntry, StaticResolver};
