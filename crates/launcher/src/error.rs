use std::path::PathBuf;

use thiserror::Error;

/// Result delivered once per launch.
pub type LaunchResult = Result<(), LaunchError>;

/// Failure outcome of a launch.
///
/// The `Display` output is the human-readable diagnostic handed to
/// completion callbacks.
#[derive(Debug, Error)]
pub enum LaunchError {
	/// The module could not be found or loaded.
	#[error("failed to load module {}: {reason}", .path.display())]
	ModuleLoad { path: PathBuf, reason: String },

	/// The module loaded but does not export the entry symbol.
	#[error("symbol `{symbol}` not found in {}: {reason}", .path.display())]
	MissingSymbol { path: PathBuf, symbol: String, reason: String },

	/// An argv token cannot be represented as a C string.
	///
	/// `index` is the position in argv, where 0 is the program name.
	#[error("argument {index} contains an interior NUL byte: {token:?}")]
	InvalidArgument { index: usize, token: String },

	/// The argument vector does not fit in a C `int` count.
	#[error("too many arguments: {count}")]
	TooManyArguments { count: usize },

	/// The entry returned a non-zero status.
	#[error("{}", exit_message(.status, .diagnostic))]
	ExitStatus { status: i32, diagnostic: Option<String> },

	/// The entry unwound with a panic.
	#[error("emulator faulted: {0}")]
	Fault(String),

	/// A launch is already in flight and the policy rejects another.
	#[error("a launch is already in progress on this launcher")]
	Busy,

	/// The worker thread could not be created.
	#[error("failed to spawn launch worker: {0}")]
	Spawn(#[source] std::io::Error),

	/// The worker went away without delivering a result.
	#[error("launch worker exited without reporting completion")]
	Abandoned,
}

fn exit_message(status: &i32, diagnostic: &Option<String>) -> String {
	match diagnostic {
		Some(text) => text.to_string(),
		None => format!("emulator exited with status {status}"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exit_status_prefers_diagnostic() {
		let err = LaunchError::ExitStatus {
			status: 1,
			diagnostic: Some("could not open disk image".into()),
		};
		assert_eq!(err.to_string(), "could not open disk image");
	}

	#[test]
	fn exit_status_falls_back_to_code() {
		let err = LaunchError::ExitStatus { status: 3, diagnostic: None };
		assert_eq!(err.to_string(), "emulator exited with status 3");
	}

	#[test]
	fn load_errors_name_the_module() {
		let err = LaunchError::MissingSymbol {
			path: PathBuf::from("libvm.so"),
			symbol: "vm_main".into(),
			reason: "undefined symbol".into(),
		};
		let msg = err.to_string();
		assert!(msg.contains("vm_main") && msg.contains("libvm.so"), "{msg}");
	}
}
