//! Emulator host binary.
//!
//! Loads an emulator module, passes the trailing arguments to its entry point
//! and exits with the launch outcome.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::Cli;
use emuhost_launcher::{Launcher, LauncherConfig};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
	let cli = Cli::parse();

	setup_tracing(cli.verbose);

	let mut config = match &cli.config {
		Some(path) => LauncherConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
		None => LauncherConfig::default(),
	};
	if let Some(program_name) = cli.program_name {
		config.program_name = program_name;
	}
	if let Some(policy) = cli.policy {
		config.policy = policy;
	}
	config.validate()?;

	let mut launcher = Launcher::with_config(config);
	for arg in cli.args {
		launcher.append(arg);
	}

	info!(module = %cli.module.display(), entry = %cli.entry, argc = launcher.args().len() + 1, "launching emulator");
	let handle = launcher.launch(&cli.module, cli.entry);
	handle.completion().await.context("emulator launch failed")?;

	info!("emulator finished");
	Ok(())
}

fn setup_tracing(verbose: bool) {
	use tracing_subscriber::EnvFilter;

	let filter = EnvFilter::try_from_env("EMUHOST_LOG")
		.or_else(|_| EnvFilter::try_from_default_env())
		.unwrap_or_else(|_| {
			if verbose {
				EnvFilter::new("emuhost=debug,emuhost_launcher=debug,emuhost_worker=trace,info")
			} else {
				EnvFilter::new("emuhost=info,emuhost_launcher=info,warn")
			}
		});

	tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}
