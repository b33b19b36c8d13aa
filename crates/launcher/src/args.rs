use std::ffi::{CString, c_char, c_int};

use crate::LaunchError;

/// Ordered argument tokens handed to the emulator entry point.
///
/// Tokens are kept verbatim: no validation, no deduplication, empty strings
/// allowed. Order is positional command-line order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArgVector {
	tokens: Vec<String>,
}

impl ArgVector {
	/// Creates an empty vector.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends one token at the end.
	pub fn append(&mut self, token: impl Into<String>) {
		self.tokens.push(token.into());
	}

	pub fn len(&self) -> usize {
		self.tokens.len()
	}

	pub fn is_empty(&self) -> bool {
		self.tokens.is_empty()
	}

	pub fn iter(&self) -> std::slice::Iter<'_, String> {
		self.tokens.iter()
	}

	pub fn as_slice(&self) -> &[String] {
		&self.tokens
	}

	/// Copies the current tokens behind a synthesized `argv[0]`.
	///
	/// Later appends do not affect the snapshot.
	pub fn snapshot(&self, program_name: &str) -> ArgSnapshot {
		let mut tokens = Vec::with_capacity(self.tokens.len() + 1);
		tokens.push(program_name.to_string());
		tokens.extend(self.tokens.iter().cloned());
		ArgSnapshot { tokens }
	}
}

impl<S: Into<String>> Extend<S> for ArgVector {
	fn extend<I: IntoIterator<Item = S>>(&mut self, iter: I) {
		for token in iter {
			self.append(token);
		}
	}
}

impl<S: Into<String>> FromIterator<S> for ArgVector {
	fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
		let mut args = Self::new();
		args.extend(iter);
		args
	}
}

impl<'a> IntoIterator for &'a ArgVector {
	type Item = &'a String;
	type IntoIter = std::slice::Iter<'a, String>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

/// Immutable argv for one launch request, program name included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSnapshot {
	tokens: Vec<String>,
}

impl ArgSnapshot {
	/// Number of argv entries, program name included.
	pub fn argc(&self) -> usize {
		self.tokens.len()
	}

	pub fn program_name(&self) -> &str {
		&self.tokens[0]
	}

	/// All argv entries, program name first.
	pub fn tokens(&self) -> &[String] {
		&self.tokens
	}

	/// Marshals the snapshot into C `main` form.
	pub fn to_c_argv(&self) -> Result<CArgv, LaunchError> {
		if c_int::try_from(self.tokens.len()).is_err() {
			return Err(LaunchError::TooManyArguments { count: self.tokens.len() });
		}
		let mut owned = Vec::with_capacity(self.tokens.len());
		for (index, token) in self.tokens.iter().enumerate() {
			let Ok(c) = CString::new(token.as_bytes()) else {
				for ptr in owned {
					// SAFETY: every pointer came from `CString::into_raw` above.
					drop(unsafe { CString::from_raw(ptr) });
				}
				return Err(LaunchError::InvalidArgument {
					index,
					token: token.clone(),
				});
			};
			owned.push(c.into_raw());
		}
		let mut argv = owned.clone();
		argv.push(std::ptr::null_mut());
		Ok(CArgv { owned, argv })
	}
}

/// NUL-terminated C strings plus a NULL-terminated pointer array
/// (`argv[argc] == NULL`).
///
/// The entry may permute or rewrite the pointer array (getopt does); the
/// strings are freed from the original pointers on drop.
#[derive(Debug)]
pub struct CArgv {
	owned: Vec<*mut c_char>,
	argv: Vec<*mut c_char>,
}

impl CArgv {
	pub fn argc(&self) -> c_int {
		// Bounded by the check in `to_c_argv`.
		self.owned.len() as c_int
	}

	/// Pointer to the first argv slot, valid while `self` lives.
	pub fn as_mut_ptr(&mut self) -> *mut *mut c_char {
		self.argv.as_mut_ptr()
	}
}

impl Drop for CArgv {
	fn drop(&mut self) {
		for ptr in self.owned.drain(..) {
			// SAFETY: every pointer came from `CString::into_raw` and is freed once.
			drop(unsafe { CString::from_raw(ptr) });
		}
	}
}

#[cfg(test)]
mod tests {
	use std::ffi::CStr;

	use pretty_assertions::assert_eq;

	use super::*;

	fn read_argv(argv: &mut CArgv) -> Vec<String> {
		let base = argv.as_mut_ptr();
		(0..argv.argc() as usize)
			.map(|i| unsafe { CStr::from_ptr(*base.add(i)) }.to_string_lossy().into_owned())
			.collect()
	}

	#[test]
	fn append_preserves_call_order() {
		let mut args = ArgVector::new();
		for token in ["-vm", "-m", "512", "-smp", "4"] {
			args.append(token);
		}
		assert_eq!(args.as_slice(), ["-vm", "-m", "512", "-smp", "4"]);
	}

	#[test]
	fn duplicates_and_empty_tokens_pass_through() {
		let args: ArgVector = ["-device", "", "-device", ""].into_iter().collect();
		assert_eq!(args.len(), 4);
		assert_eq!(args.as_slice(), ["-device", "", "-device", ""]);
	}

	#[test]
	fn snapshot_synthesizes_program_name() {
		let args: ArgVector = ["-vm", "-m", "512"].into_iter().collect();
		let snapshot = args.snapshot("qemu");
		assert_eq!(snapshot.argc(), 4);
		assert_eq!(snapshot.program_name(), "qemu");
		assert_eq!(snapshot.tokens(), ["qemu", "-vm", "-m", "512"]);
	}

	#[test]
	fn snapshot_is_detached_from_later_appends() {
		let mut args = ArgVector::new();
		args.append("-m");
		let snapshot = args.snapshot("qemu");
		args.append("512");
		assert_eq!(snapshot.tokens(), ["qemu", "-m"]);
		assert_eq!(args.len(), 2);
	}

	#[test]
	fn c_argv_is_null_terminated() {
		let args: ArgVector = ["-vm", "", "512"].into_iter().collect();
		let mut argv = args.snapshot("qemu").to_c_argv().unwrap();
		assert_eq!(argv.argc(), 4);
		assert_eq!(read_argv(&mut argv), ["qemu", "-vm", "", "512"]);
		let terminator = unsafe { *argv.as_mut_ptr().add(4) };
		assert!(terminator.is_null());
	}

	#[test]
	fn c_argv_survives_pointer_permutation() {
		let args: ArgVector = ["a", "b"].into_iter().collect();
		let mut argv = args.snapshot("p").to_c_argv().unwrap();
		let base = argv.as_mut_ptr();
		unsafe { std::ptr::swap(base.add(1), base.add(2)) };
		assert_eq!(read_argv(&mut argv), ["p", "b", "a"]);
	}

	#[test]
	fn interior_nul_is_reported_with_position() {
		let args: ArgVector = ["-m", "5\012"].into_iter().collect();
		let err = args.snapshot("qemu").to_c_argv().unwrap_err();
		assert!(matches!(err, LaunchError::InvalidArgument { index: 2, .. }), "{err}");
	}
}
