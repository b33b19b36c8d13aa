use std::path::PathBuf;

use clap::Parser;
use emuhost_launcher::LaunchPolicy;

#[derive(Parser, Debug)]
#[command(name = "emuhost")]
#[command(about = "Run an emulator module in-process")]
#[command(version)]
/// Command-line arguments.
pub struct Cli {
	/// Path of the emulator module to load
	#[arg(long, short = 'm', value_name = "PATH")]
	pub module: PathBuf,

	/// Entry symbol with an `int main(int, char **)` signature
	#[arg(long, short = 'e', default_value = "qemu_main")]
	pub entry: String,

	/// Launcher configuration file (TOML)
	#[arg(long, short = 'c', value_name = "PATH")]
	pub config: Option<PathBuf>,

	/// Overrides the synthesized argv[0]
	#[arg(long)]
	pub program_name: Option<String>,

	/// Overrides the concurrent launch policy (reject, serialize or concurrent)
	#[arg(long)]
	pub policy: Option<LaunchPolicy>,

	/// Verbose logging
	#[arg(short, long)]
	pub verbose: bool,

	/// Arguments passed to the emulator after argv[0]
	#[arg(last = true, allow_hyphen_values = true)]
	pub args: Vec<String>,
}
