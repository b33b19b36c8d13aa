//! Each launch runs on its own worker thread:
//!
//! `Idle -> Loading -> Running -> Completed(success | failure)`
//!
//! Loading failures skip `Running`. Completion is produced on the worker
//! thread after the entry returns and is delivered exactly once. The only
//! result produced elsewhere is [`LaunchError::Spawn`], which is delivered on
//! the calling thread because no worker exists.

use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use emuhost_worker::{TaskClass, ThreadSpec, panic_message, spawn_named_thread};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::args::{ArgSnapshot, ArgVector};
use crate::config::{LaunchPolicy, LauncherConfig};
use crate::diagnostics::Collection;
use crate::resolver::{DylibResolver, ModuleResolver};
use crate::{LaunchError, LaunchResult};


static NEXT_LAUNCH_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle position of one launch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchState {
	Idle,
	Loading,
	Running,
	Completed { success: bool },
}

impl LaunchState {
	const fn to_raw(self) -> u8 {
		match self {
			Self::Idle => 0,
			Self::Loading => 1,
			Self::Running => 2,
			Self::Completed { success: true } => 3,
			Self::Completed { success: false } => 4,
		}
	}

	const fn from_raw(raw: u8) -> Self {
		match raw {
			0 => Self::Idle,
			1 => Self::Loading,
			2 => Self::Running,
			3 => Self::Completed { success: true },
			_ => Self::Completed { success: false },
		}
	}

	pub const fn is_completed(self) -> bool {
		matches!(self, Self::Completed { .. })
	}
}

/// Shared, read-only view of a launch's lifecycle.
#[derive(Debug, Clone)]
pub struct LaunchMonitor {
	id: u64,
	state: Arc<AtomicU8>,
}

impl LaunchMonitor {
	fn new(id: u64) -> Self {
		Self {
			id,
			state: Arc::new(AtomicU8::new(LaunchState::Idle.to_raw())),
		}
	}

	/// Process-unique launch id; also the worker thread name suffix.
	pub fn id(&self) -> u64 {
		self.id
	}

	pub fn state(&self) -> LaunchState {
		LaunchState::from_raw(self.state.load(Ordering::Acquire))
	}

	pub fn is_finished(&self) -> bool {
		self.state().is_completed()
	}

	fn set(&self, state: LaunchState) {
		tracing::debug!(id = self.id, ?state, "launch state");
		self.state.store(state.to_raw(), Ordering::Release);
	}
}

/// Completion side of a launch started with [`Launcher::launch`].
///
/// Dropping the handle does not stop the emulator.
#[derive(Debug)]
pub struct LaunchHandle {
	monitor: LaunchMonitor,
	rx: oneshot::Receiver<LaunchResult>,
}

impl LaunchHandle {
	pub fn id(&self) -> u64 {
		self.monitor.id()
	}

	pub fn state(&self) -> LaunchState {
		self.monitor.state()
	}

	pub fn is_finished(&self) -> bool {
		self.monitor.is_finished()
	}

	pub fn monitor(&self) -> LaunchMonitor {
		self.monitor.clone()
	}

	/// Waits for the entry to return.
	pub async fn completion(self) -> LaunchResult {
		self.rx.await.unwrap_or(Err(LaunchError::Abandoned))
	}

	/// Blocks the current thread until the entry returns.
	///
	/// # Panics
	/// When called from within an asynchronous execution context.
	pub fn wait(self) -> LaunchResult {
		self.rx.blocking_recv().unwrap_or(Err(LaunchError::Abandoned))
	}

	/// Returns the result if it has already been delivered.
	pub fn try_result(&mut self) -> Option<LaunchResult> {
		match self.rx.try_recv() {
			Ok(result) => Some(result),
			Err(oneshot::error::TryRecvError::Empty) => None,
			Err(oneshot::error::TryRecvError::Closed) => Some(Err(LaunchError::Abandoned)),
		}
	}
}

type Deliver = Box<dyn FnOnce(LaunchResult) + Send + 'static>;

/// Clears the in-flight flag when the admitted launch finishes.
struct InFlight(Arc<AtomicBool>);

impl Drop for InFlight {
	fn drop(&mut self) {
		self.0.store(false, Ordering::Release);
	}
}

enum Admission {
	Exclusive(InFlight),
	Rejected,
	Serialized(Arc<Mutex<()>>),
	Concurrent,
}

/// Immutable inputs of one launch attempt.
#[derive(Debug)]
struct LaunchRequest {
	module: PathBuf,
	entry: String,
	args: ArgSnapshot,
}

/// Accumulates emulator arguments and runs the emulator off-thread.
pub struct Launcher {
	args: ArgVector,
	config: LauncherConfig,
	resolver: Arc<dyn ModuleResolver>,
	in_flight: Arc<AtomicBool>,
	turn: Arc<Mutex<()>>,
}

impl Default for Launcher {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Debug for Launcher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Launcher")
			.field("args", &self.args)
			.field("config", &self.config)
			.field("in_flight", &self.in_flight.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl Launcher {
	/// Creates a launcher with default configuration and dynamic loading.
	pub fn new() -> Self {
		Self::with_config(LauncherConfig::default())
	}

	pub fn with_config(config: LauncherConfig) -> Self {
		Self::with_resolver(config, DylibResolver::new())
	}

	pub fn with_resolver(config: LauncherConfig, resolver: impl ModuleResolver) -> Self {
		Self {
			args: ArgVector::new(),
			config,
			resolver: Arc::new(resolver),
			in_flight: Arc::new(AtomicBool::new(false)),
			turn: Arc::new(Mutex::new(())),
		}
	}

	/// Appends an argument token. See [`ArgVector::append`].
	pub fn append(&mut self, token: impl Into<String>) {
		self.args.append(token);
	}

	pub fn args(&self) -> &ArgVector {
		&self.args
	}

	pub fn config(&self) -> &LauncherConfig {
		&self.config
	}

	/// Starts `entry` from `module` with a snapshot of the current arguments.
	///
	/// Returns immediately; every failure arrives through the handle.
	pub fn launch(&self, module: impl AsRef<Path>, entry: impl Into<String>) -> LaunchHandle {
		let (tx, rx) = oneshot::channel();
		let monitor = self.start(
			module.as_ref(),
			entry.into(),
			Box::new(move |result| {
				// The receiver may be gone; the launch still ran.
				let _ = tx.send(result);
			}),
		);
		LaunchHandle { monitor, rx }
	}

	/// Callback form of [`Self::launch`].
	///
	/// `on_complete` runs exactly once on the launch worker thread with
	/// `(true, None)` or `(false, Some(diagnostic))`.
	pub fn launch_with<F>(&self, module: impl AsRef<Path>, entry: impl Into<String>, on_complete: F) -> LaunchMonitor
	where
		F: FnOnce(bool, Option<String>) + Send + 'static,
	{
		self.start(
			module.as_ref(),
			entry.into(),
			Box::new(move |result| match result {
				Ok(()) => on_complete(true, None),
				Err(err) => on_complete(false, Some(err.to_string())),
			}),
		)
	}

	fn admit(&self) -> Admission {
		match self.config.policy {
			LaunchPolicy::Reject => {
				if self.in_flight.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).is_ok() {
					Admission::Exclusive(InFlight(Arc::clone(&self.in_flight)))
				} else {
					Admission::Rejected
				}
			}
			LaunchPolicy::Serialize => Admission::Serialized(Arc::clone(&self.turn)),
			LaunchPolicy::Concurrent => Admission::Concurrent,
		}
	}

	fn start(&self, module: &Path, entry: String, deliver: Deliver) -> LaunchMonitor {
		let id = NEXT_LAUNCH_ID.fetch_add(1, Ordering::Relaxed);
		let monitor = LaunchMonitor::new(id);
		let request = LaunchRequest {
			module: module.to_path_buf(),
			entry,
			args: self.args.snapshot(&self.config.program_name),
		};
		let span = tracing::info_span!(
			"launch",
			id,
			module = %request.module.display(),
			entry = %request.entry,
		);
		let admission = self.admit();
		let deliver = Arc::new(Mutex::new(Some(deliver)));

		let mut spec = ThreadSpec::new(TaskClass::LongRunning, format!("{}-{id}", self.config.thread_name));
		if let Some(bytes) = self.config.stack_size {
			spec = spec.stack_size(bytes);
		}

		let job = {
			let monitor = monitor.clone();
			let deliver = Arc::clone(&deliver);
			let resolver = Arc::clone(&self.resolver);
			let reporter_symbol = self.config.reporter_symbol.clone();
			let span = span.clone();
			move || {
				let _entered = span.enter();
				let result = match admission {
					Admission::Rejected => Err(LaunchError::Busy),
					Admission::Exclusive(in_flight) => {
						let result = execute(&request, resolver.as_ref(), reporter_symbol.as_deref(), &monitor);
						drop(in_flight);
						result
					}
					Admission::Serialized(turn) => {
						let _turn = turn.lock();
						execute(&request, resolver.as_ref(), reporter_symbol.as_deref(), &monitor)
					}
					Admission::Concurrent => execute(&request, resolver.as_ref(), reporter_symbol.as_deref(), &monitor),
				};
				complete(&monitor, &deliver, result);
			}
		};

		if let Err(err) = spawn_named_thread(spec, job) {
			let _entered = span.enter();
			complete(&monitor, &deliver, Err(LaunchError::Spawn(err)));
		}
		monitor
	}
}

fn complete(monitor: &LaunchMonitor, deliver: &Mutex<Option<Deliver>>, result: LaunchResult) {
	match &result {
		Ok(()) => tracing::info!("emulator exited successfully"),
		Err(err) => tracing::warn!(error = %err, "launch failed"),
	}
	monitor.set(LaunchState::Completed { success: result.is_ok() });
	let deliver = deliver.lock().take();
	if let Some(deliver) = deliver {
		deliver(result);
	}
}

/// Runs one request; a panic anywhere in loading or running becomes a
/// [`LaunchError::Fault`] so completion is still delivered.
fn execute(request: &LaunchRequest, resolver: &dyn ModuleResolver, reporter_symbol: Option<&str>, monitor: &LaunchMonitor) -> LaunchResult {
	std::panic::catch_unwind(AssertUnwindSafe(|| run(request, resolver, reporter_symbol, monitor))).unwrap_or_else(|payload| {
		let message = panic_message(payload.as_ref()).unwrap_or_else(|| "<unknown panic>".to_string());
		Err(LaunchError::Fault(message))
	})
}

fn run(request: &LaunchRequest, resolver: &dyn ModuleResolver, reporter_symbol: Option<&str>, monitor: &LaunchMonitor) -> LaunchResult {
	monitor.set(LaunchState::Loading);
	let mut argv = request.args.to_c_argv()?;
	let entry = resolver.resolve(&request.module, &request.entry, reporter_symbol)?;
	entry.install_reporter();

	let collection = Collection::begin();
	monitor.set(LaunchState::Running);
	tracing::info!(argc = argv.argc(), "emulator running");
	// SAFETY: the resolver vouches for the `EntryFn` signature; `argv` outlives the call.
	let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| unsafe { entry.invoke(&mut argv) }));
	let diagnostic = collection.finish();

	match outcome {
		Ok(0) => {
			if let Some(text) = diagnostic {
				tracing::debug!(diagnostic = %text, "emulator reported diagnostics but exited cleanly");
			}
			Ok(())
		}
		Ok(status) => Err(LaunchError::ExitStatus { status, diagnostic }),
		Err(payload) => {
			let mut message = panic_message(payload.as_ref()).unwrap_or_else(|| "<unknown panic>".to_string());
			if let Some(text) = diagnostic {
				message.push_str(": ");
				message.push_str(&text);
			}
			Err(LaunchError::Fault(message))
		}
	}
}
