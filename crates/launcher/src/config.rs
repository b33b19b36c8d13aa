use std::path::{Path, PathBuf};

use serde::de::IntoDeserializer;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Default stack size for launch workers. Emulator main loops recurse deeply
/// during machine setup, so the platform default is too small.
pub const DEFAULT_STACK_SIZE: usize = 8 * 1024 * 1024;

/// Errors that can occur when loading launcher configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error parsing TOML.
	#[error("TOML parse error: {0}")]
	Toml(#[from] toml::de::Error),

	/// Error reading a configuration file.
	#[error("I/O error reading {path}: {error}", path = .path.display())]
	Io {
		/// Path to the file that failed to read.
		path: PathBuf,
		/// The underlying I/O error.
		error: std::io::Error,
	},

	/// A field holds a value the launcher cannot use.
	#[error("invalid value for `{field}`: {reason}")]
	Invalid { field: &'static str, reason: String },
}

/// How a launcher treats a launch issued while another is still running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchPolicy {
	/// Complete the new request with [`crate::LaunchError::Busy`].
	#[default]
	Reject,
	/// Queue the new request on its worker until the previous one finishes.
	Serialize,
	/// Run requests side by side.
	Concurrent,
}

impl std::str::FromStr for LaunchPolicy {
	type Err = ConfigError;

	/// Accepts the same snake_case names as the config file.
	fn from_str(value: &str) -> Result<Self, Self::Err> {
		Self::deserialize(value.into_deserializer()).map_err(|e: serde::de::value::Error| ConfigError::Invalid {
			field: "policy",
			reason: e.to_string(),
		})
	}
}

/// Launcher settings.
///
/// Every field has a default, so an empty document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LauncherConfig {
	/// Token synthesized as `argv[0]`.
	pub program_name: String,
	pub policy: LaunchPolicy,
	/// Worker thread name prefix; the launch id is appended.
	pub thread_name: String,
	/// Worker stack size in bytes. `None` keeps the platform default; in
	/// TOML, `stack_size = 0` selects it.
	#[serde(deserialize_with = "zero_as_platform_default")]
	pub stack_size: Option<usize>,
	/// Optional symbol through which a module accepts the host's diagnostic
	/// reporter. Modules that do not export it are still launchable. `None`
	/// skips the lookup; in TOML, `reporter_symbol = ""` selects it.
	#[serde(deserialize_with = "empty_as_disabled")]
	pub reporter_symbol: Option<String>,
}

impl Default for LauncherConfig {
	fn default() -> Self {
		Self {
			program_name: "qemu".to_string(),
			policy: LaunchPolicy::default(),
			thread_name: "emuhost-vm".to_string(),
			stack_size: Some(DEFAULT_STACK_SIZE),
			reporter_symbol: Some(crate::diagnostics::DEFAULT_REPORTER_SYMBOL.to_string()),
		}
	}
}

fn zero_as_platform_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<usize>, D::Error> {
	let bytes = usize::deserialize(deserializer)?;
	Ok((bytes != 0).then_some(bytes))
}

fn empty_as_disabled<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
	let symbol = String::deserialize(deserializer)?;
	Ok((!symbol.is_empty()).then_some(symbol))
}

impl LauncherConfig {
	/// Parses and validates a TOML document.
	pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
		let config: Self = toml::from_str(input)?;
		config.validate()?;
		Ok(config)
	}

	/// Reads, parses and validates a TOML file.
	pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
			path: path.to_path_buf(),
			error,
		})?;
		let config = Self::from_toml_str(&content)?;
		tracing::debug!(path = %path.display(), ?config, "loaded launcher config");
		Ok(config)
	}

	/// Checks values that would otherwise fail only once a launch is running.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.program_name.contains('\0') {
			return Err(ConfigError::Invalid {
				field: "program_name",
				reason: "contains a NUL byte".into(),
			});
		}
		if self.thread_name.is_empty() || self.thread_name.contains('\0') {
			return Err(ConfigError::Invalid {
				field: "thread_name",
				reason: "must be non-empty and free of NUL bytes".into(),
			});
		}
		if self.stack_size == Some(0) {
			return Err(ConfigError::Invalid {
				field: "stack_size",
				reason: "must be greater than zero".into(),
			});
		}
		if let Some(symbol) = &self.reporter_symbol
			&& (symbol.is_empty() || symbol.contains('\0'))
		{
			return Err(ConfigError::Invalid {
				field: "reporter_symbol",
				reason: "must be non-empty and free of NUL bytes".into(),
			});
		}
		Ok(())
	}
}
