/// Execution classes used for worker thread scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Work that owns its thread for an unbounded duration, such as an
	/// emulator main loop.
	LongRunning,
}

impl TaskClass {
	pub(crate) const fn as_str(self) -> &'static str {
		match self {
			Self::LongRunning => "long_running",
		}
	}
}
