//! Registry trait for self-registering implementations.

/// Base trait for implementation registries.
///
/// Each pluggable backend module (storage, payment provider) provides a
/// `Registry` struct implementing this trait, declaring the name used for it
/// in configuration and the factory that builds it.
pub trait ImplementationRegistry {
	/// Name used in configuration files, e.g. "memory" for
	/// `[storage.implementations.memory]`.
	const NAME: &'static str;

	/// Factory function type this implementation provides.
	type Factory;

	/// Returns the factory function for this implementation.
	fn factory() -> Self::Factory;
}
