use std::thread::JoinHandle;

use crate::TaskClass;

/// Parameters for a dedicated worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadSpec {
	pub class: TaskClass,
	pub name: String,
	/// Stack size in bytes. `None` keeps the platform default.
	pub stack_size: Option<usize>,
}

impl ThreadSpec {
	/// Creates a spec with the platform default stack size.
	pub fn new(class: TaskClass, name: impl Into<String>) -> Self {
		Self {
			class,
			name: name.into(),
			stack_size: None,
		}
	}

	/// Overrides the stack size.
	pub fn stack_size(mut self, bytes: usize) -> Self {
		self.stack_size = Some(bytes);
		self
	}
}

/// Spawns a dedicated named OS thread described by `spec`.
///
/// Fails only when the OS refuses to create the thread.
pub fn spawn_named_thread<F, R>(spec: ThreadSpec, f: F) -> std::io::Result<JoinHandle<R>>
where
	F: FnOnce() -> R + Send + 'static,
	R: Send + 'static,
{
	tracing::trace!(
		worker_class = spec.class.as_str(),
		name = %spec.name,
		stack_size = ?spec.stack_size,
		"worker.spawn_named_thread"
	);
	let mut builder = std::thread::Builder::new().name(spec.name);
	if let Some(bytes) = spec.stack_size {
		builder = builder.stack_size(bytes);
	}
	builder.spawn(f)
}
