//! Stub emulator module.
//!
//! Each export follows `int entry(int argc, char **argv)`. Failure text goes
//! through the host reporter registered with [`emuhost_set_error_reporter`].

use std::ffi::{CStr, CString, c_char, c_int};
use std::sync::Mutex;
use std::time::Duration;

/// Arguments `vm_main` expects after the program name.
pub const EXPECTED_ARGS: [&str; 3] = ["-vm", "-m", "512"];

static REPORTER: Mutex<Option<extern "C" fn(*const c_char)>> = Mutex::new(None);

fn report(message: &str) {
	let reporter = REPORTER.lock().ok().and_then(|guard| *guard);
	if let Some(report) = reporter
		&& let Ok(message) = CString::new(message)
	{
		report(message.as_ptr());
	}
}

unsafe fn collect_args(argc: c_int, argv: *const *const c_char) -> Vec<String> {
	if argv.is_null() {
		return Vec::new();
	}
	(0..argc.max(0) as usize)
		.map(|i| unsafe { *argv.add(i) })
		.take_while(|ptr| !ptr.is_null())
		.map(|ptr| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
		.collect()
}

/// Stores the host's diagnostic reporter.
///
/// # Safety
/// `report` must stay callable for as long as this module is loaded.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn emuhost_set_error_reporter(report: extern "C" fn(*const c_char)) {
	if let Ok(mut guard) = REPORTER.lock() {
		*guard = Some(report);
	}
}

/// Exits 0 when called as `<program> -vm -m 512`, otherwise reports the
/// arguments it saw and exits 2.
///
/// # Safety
/// `argv` must point to `argc` valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vm_main(argc: c_int, argv: *const *const c_char) -> c_int {
	let args = unsafe { collect_args(argc, argv) };
	if argc == 4 && args.len() == 4 && args[1..] == EXPECTED_ARGS {
		0
	} else {
		report(&format!("unexpected arguments (argc={argc}): {args:?}"));
		2
	}
}

/// Reports each argument as one diagnostic line and exits 1.
///
/// # Safety
/// `argv` must point to `argc` valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vm_echo_args(argc: c_int, argv: *const *const c_char) -> c_int {
	for arg in unsafe { collect_args(argc, argv) } {
		report(&arg);
	}
	1
}

/// Sleeps for `argv[1]` milliseconds (default 200), then exits 0.
///
/// # Safety
/// `argv` must point to `argc` valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vm_sleep(argc: c_int, argv: *const *const c_char) -> c_int {
	let args = unsafe { collect_args(argc, argv) };
	let millis = args.get(1).and_then(|ms| ms.parse().ok()).unwrap_or(200);
	std::thread::sleep(Duration::from_millis(millis));
	0
}

/// Exits with the status in `argv[1]` (default 1) without reporting.
///
/// # Safety
/// `argv` must point to `argc` valid NUL-terminated strings.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vm_exit_status(argc: c_int, argv: *const *const c_char) -> c_int {
	let args = unsafe { collect_args(argc, argv) };
	args.get(1).and_then(|status| status.parse().ok()).unwrap_or(1)
}
