use std::collections::HashMap;
use std::ffi::{c_char, c_int};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};

use libloading::{Library, Symbol};
use parking_lot::Mutex;

use crate::LaunchError;
use crate::args::CArgv;
use crate::diagnostics::{RegisterReporterFn, host_report};

/// `int main(int argc, char **argv)`-shaped emulator entry point.
///
/// Declared `C-unwind` so a Rust panic escaping the module reaches the
/// launcher's unwind boundary instead of aborting.
pub type EntryFn = unsafe extern "C-unwind" fn(argc: c_int, argv: *mut *mut c_char) -> c_int;

/// An entry point ready to invoke, keeping its module loaded.
pub struct ResolvedEntry {
	entry: EntryFn,
	register_reporter: Option<RegisterReporterFn>,
	module: Option<Arc<Library>>,
}

impl std::fmt::Debug for ResolvedEntry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResolvedEntry")
			.field("reporter", &self.register_reporter.is_some())
			.field("dynamic", &self.module.is_some())
			.finish()
	}
}

impl ResolvedEntry {
	/// Wraps an entry linked into the host.
	pub fn linked(entry: EntryFn) -> Self {
		Self {
			entry,
			register_reporter: None,
			module: None,
		}
	}

	pub fn with_reporter(mut self, register: RegisterReporterFn) -> Self {
		self.register_reporter = Some(register);
		self
	}

	/// Hands the host reporter to the module, if it accepts one.
	pub(crate) fn install_reporter(&self) {
		if let Some(register) = self.register_reporter {
			// SAFETY: the symbol was resolved with the `RegisterReporterFn` signature.
			unsafe { register(host_report) };
		}
	}

	/// Runs the entry on the current thread until it returns.
	///
	/// # Safety
	/// The resolved symbol must have the [`EntryFn`] signature.
	pub(crate) unsafe fn invoke(&self, argv: &mut CArgv) -> c_int {
		unsafe { (self.entry)(argv.argc(), argv.as_mut_ptr()) }
	}
}

/// Resolves an entry symbol inside a module.
///
/// Platform loading mechanics stay behind this trait.
pub trait ModuleResolver: Send + Sync + 'static {
	/// Loads `module` and looks up `symbol`. When `reporter_symbol` is set
	/// and exported, the returned entry carries the reporter registration.
	fn resolve(&self, module: &Path, symbol: &str, reporter_symbol: Option<&str>) -> Result<ResolvedEntry, LaunchError>;
}

/// Modules loaded process-wide, keyed by the path they were requested with.
///
/// Entries are weak: a module unloads once its last running entry returns,
/// and concurrent launches of the same path share one load.
static MODULES: LazyLock<Mutex<HashMap<PathBuf, Weak<Library>>>> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// Loads modules with the platform dynamic loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibResolver;

impl DylibResolver {
	pub fn new() -> Self {
		Self
	}

	pub(crate) fn load(&self, path: &Path) -> Result<Arc<Library>, LaunchError> {
		let mut modules = MODULES.lock();
		if let Some(library) = modules.get(path).and_then(Weak::upgrade) {
			tracing::debug!(module = %path.display(), "reusing loaded module");
			return Ok(library);
		}

		// SAFETY: loading runs the module's initializers; the host trusts the
		// module it was asked to launch.
		let library = unsafe { Library::new(path) }.map_err(|e| LaunchError::ModuleLoad {
			path: path.to_path_buf(),
			reason: e.to_string(),
		})?;
		let library = Arc::new(library);
		modules.retain(|_, weak| weak.strong_count() > 0);
		modules.insert(path.to_path_buf(), Arc::downgrade(&library));
		tracing::debug!(module = %path.display(), "loaded module");
		Ok(library)
	}
}

impl ModuleResolver for DylibResolver {
	fn resolve(&self, module: &Path, symbol: &str, reporter_symbol: Option<&str>) -> Result<ResolvedEntry, LaunchError> {
		let library = self.load(module)?;

		// SAFETY: the symbol is declared to follow the `EntryFn` ABI.
		let entry = unsafe { library.get::<EntryFn>(symbol.as_bytes()) }
			.map(|sym: Symbol<'_, EntryFn>| *sym)
			.map_err(|e| LaunchError::MissingSymbol {
				path: module.to_path_buf(),
				symbol: symbol.to_string(),
				reason: e.to_string(),
			})?;

		let register_reporter = reporter_symbol.and_then(|name| {
			// SAFETY: the reporter hook is declared to follow `RegisterReporterFn`.
			match unsafe { library.get::<RegisterReporterFn>(name.as_bytes()) } {
				Ok(sym) => Some(*sym),
				Err(_) => {
					tracing::trace!(module = %module.display(), symbol = name, "module has no reporter hook");
					None
				}
			}
		});

		Ok(ResolvedEntry {
			entry,
			register_reporter,
			module: Some(library),
		})
	}
}

/// Resolves entries linked into the host, keyed by module name and symbol.
///
/// Useful where dynamic loading is unavailable and for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticResolver {
	modules: HashMap<PathBuf, HashMap<String, EntryFn>>,
	reporters: HashMap<PathBuf, RegisterReporterFn>,
}

impl StaticResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `entry` as `symbol` of `module`.
	pub fn register(mut self, module: impl Into<PathBuf>, symbol: impl Into<String>, entry: EntryFn) -> Self {
		self.modules.entry(module.into()).or_default().insert(symbol.into(), entry);
		self
	}

	/// Registers the reporter hook of `module`.
	pub fn register_reporter(mut self, module: impl Into<PathBuf>, register: RegisterReporterFn) -> Self {
		let module = module.into();
		self.modules.entry(module.clone()).or_default();
		self.reporters.insert(module, register);
		self
	}
}

impl ModuleResolver for StaticResolver {
	fn resolve(&self, module: &Path, symbol: &str, reporter_symbol: Option<&str>) -> Result<ResolvedEntry, LaunchError> {
		let symbols = self.modules.get(module).ok_or_else(|| LaunchError::ModuleLoad {
			path: module.to_path_buf(),
			reason: "no such linked module".into(),
		})?;
		let entry = symbols.get(symbol).copied().ok_or_else(|| LaunchError::MissingSymbol {
			path: module.to_path_buf(),
			symbol: symbol.to_string(),
			reason: "not registered".into(),
		})?;
		let mut resolved = ResolvedEntry::linked(entry);
		if reporter_symbol.is_some()
			&& let Some(register) = self.reporters.get(module)
		{
			resolved = resolved.with_reporter(*register);
		}
		Ok(resolved)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	unsafe extern "C-unwind" fn noop(_argc: c_int, _argv: *mut *mut c_char) -> c_int {
		0
	}

	#[test]
	fn missing_module_path_fails_to_load() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("libmissing-vm.so");
		let err = DylibResolver::new().resolve(&path, "vm_main", None).unwrap_err();
		assert!(matches!(err, LaunchError::ModuleLoad { .. }), "{err}");
	}

	#[test]
	fn non_module_file_fails_to_load() {
		let file = tempfile::NamedTempFile::new().unwrap();
		std::fs::write(file.path(), b"not a shared object").unwrap();
		let err = DylibResolver::new().resolve(file.path(), "vm_main", None).unwrap_err();
		assert!(matches!(err, LaunchError::ModuleLoad { .. }), "{err}");
	}

	#[cfg(all(target_os = "linux", target_env = "gnu"))]
	#[test]
	fn missing_symbol_in_real_module() {
		let err = DylibResolver::new()
			.resolve(Path::new("libc.so.6"), "emuhost_definitely_not_exported", None)
			.unwrap_err();
		match err {
			LaunchError::MissingSymbol { symbol, .. } => assert_eq!(symbol, "emuhost_definitely_not_exported"),
			other => panic!("expected MissingSymbol, got {other}"),
		}
	}

	#[cfg(all(target_os = "linux", target_env = "gnu"))]
	#[test]
	fn concurrent_holders_share_one_load() {
		let resolver = DylibResolver::new();
		let first = resolver.load(Path::new("libc.so.6")).unwrap();
		let second = resolver.load(Path::new("libc.so.6")).unwrap();
		assert!(Arc::ptr_eq(&first, &second));
	}

	#[test]
	fn static_resolver_distinguishes_module_and_symbol() {
		let resolver = StaticResolver::new().register("libvm.so", "vm_main", noop);
		assert!(resolver.resolve(Path::new("libvm.so"), "vm_main", None).is_ok());
		assert!(matches!(
			resolver.resolve(Path::new("libother.so"), "vm_main", None),
			Err(LaunchError::ModuleLoad { .. })
		));
		assert!(matches!(
			resolver.resolve(Path::new("libvm.so"), "qemu_main", None),
			Err(LaunchError::MissingSymbol { .. })
		));
	}
}
