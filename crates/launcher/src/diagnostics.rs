//! Emulators report failure text out of band, through a host callback
//! registered before the entry runs. Reports are attributed to the launch
//! whose worker thread makes the call.

use std::cell::RefCell;
use std::ffi::{CStr, c_char};

/// Symbol looked up by default to hand the reporter to a module.
pub const DEFAULT_REPORTER_SYMBOL: &str = "emuhost_set_error_reporter";

/// Host callback receiving one NUL-terminated diagnostic message.
pub type ReporterFn = extern "C" fn(message: *const c_char);

/// Module export that stores the host reporter.
pub type RegisterReporterFn = unsafe extern "C" fn(report: ReporterFn);

thread_local! {
	static COLLECTOR: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Reporter handed to modules.
pub extern "C" fn host_report(message: *const c_char) {
	if message.is_null() {
		return;
	}
	// SAFETY: the module passes a NUL-terminated string valid for this call.
	let text = unsafe { CStr::from_ptr(message) }.to_string_lossy().into_owned();
	report(text);
}

/// Records a diagnostic for the launch running on the current thread.
///
/// Statically linked emulators can call this directly. Calls from threads
/// other than a launch worker are only logged.
pub fn report(text: impl Into<String>) {
	let text = text.into();
	let unclaimed = COLLECTOR.with(|collector| match collector.borrow_mut().as_mut() {
		Some(messages) => {
			tracing::debug!(message = %text, "emulator diagnostic");
			messages.push(text);
			None
		}
		None => Some(text),
	});
	if let Some(text) = unclaimed {
		tracing::warn!(message = %text, "emulator diagnostic reported outside a launch worker");
	}
}

/// Collects reports on the current thread until finished or dropped.
pub(crate) struct Collection {
	_not_send: std::marker::PhantomData<*const ()>,
}

impl Collection {
	pub(crate) fn begin() -> Self {
		COLLECTOR.with(|collector| *collector.borrow_mut() = Some(Vec::new()));
		Self {
			_not_send: std::marker::PhantomData,
		}
	}

	/// Returns collected messages joined by newlines, or `None` if nothing
	/// was reported.
	pub(crate) fn finish(self) -> Option<String> {
		let messages = COLLECTOR.with(|collector| collector.borrow_mut().take()).unwrap_or_default();
		(!messages.is_empty()).then(|| messages.join("\n"))
	}
}

impl Drop for Collection {
	fn drop(&mut self) {
		COLLECTOR.with(|collector| collector.borrow_mut().take());
	}
}
