//! Builder pattern for constructing escrow engines.
//!
//! Composes an EscrowEngine from factory functions keyed by implementation
//! name, so storage backends and payment providers stay pluggable.

use crate::clock::{Clock, SystemClock};
use crate::engine::EscrowEngine;
use crate::event_bus::EventBus;
use escrow_config::Config;
use escrow_payment::{
	PaymentBinding, PaymentError, PaymentProviderInterface, PaymentService,
};
use escrow_storage::{StorageError, StorageInterface, StorageService};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during escrow engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Container for the factory functions needed to build an EscrowEngine.
pub struct EscrowFactories<SF, PF> {
	pub storage_factories: HashMap<String, SF>,
	pub payment_factories: HashMap<String, PF>,
}

/// Builder for constructing an EscrowEngine with pluggable implementations.
pub struct EscrowBuilder {
	config: Config,
	clock: Arc<dyn Clock>,
	event_capacity: usize,
}

impl EscrowBuilder {
	/// Creates a new EscrowBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: Arc::new(SystemClock),
			event_capacity: crate::event_bus::DEFAULT_CAPACITY,
		}
	}

	/// Replaces the wall clock, used by tests that move time.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;
		self
	}

	pub fn with_event_capacity(mut self, capacity: usize) -> Self {
		self.event_capacity = capacity;
		self
	}

	/// Builds the EscrowEngine using factories for each component type.
	pub fn build<SF, PF>(
		self,
		factories: EscrowFactories<SF, PF>,
	) -> Result<EscrowEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
		PF: Fn(&toml::Value) -> Result<Box<dyn PaymentProviderInterface>, PaymentError>,
	{
		// Create storage implementations
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(component = "storage", implementation = %name, "Unknown implementation, skipped");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					storage_impls.insert(name.clone(), implementation);
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!("primary storage '{}'", primary_storage))
		})?;
		let storage = Arc::new(StorageService::new(storage_backend));

		// Create payment providers
		let mut payment_impls: HashMap<String, Arc<dyn PaymentProviderInterface>> = HashMap::new();
		for (name, config) in &self.config.payment.implementations {
			let Some(factory) = factories.payment_factories.get(name) else {
				tracing::warn!(component = "payment", implementation = %name, "Unknown implementation, skipped");
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					payment_impls.insert(name.clone(), Arc::from(implementation));
					let is_primary = &self.config.payment.primary == name;
					tracing::info!(component = "payment", implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = "payment",
						implementation = %name,
						error = %e,
						"Failed to create payment provider"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create payment provider '{}': {}",
						name, e
					)));
				},
			}
		}

		if !payment_impls.contains_key(&self.config.payment.primary) {
			return Err(BuilderError::MissingComponent(format!(
				"primary payment provider '{}'",
				self.config.payment.primary
			)));
		}
		let payments = PaymentService::new(payment_impls, self.config.payment.primary.clone())
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		let binding = PaymentBinding::from_formats(&self.config.payment.reference_formats)
			.map_err(|e| BuilderError::Config(e.to_string()))?;

		Ok(EscrowEngine::new(
			self.config,
			storage,
			Arc::new(payments),
			binding,
			EventBus::new(self.event_capacity),
			self.clock,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use escrow_payment::PaymentProviderFactory;
	use escrow_storage::StorageFactory;

	const CONFIG: &str = r#"
[engine]
id = "builder-test"

[storage]
primary = "memory"
[storage.implementations.memory]

[payment]
primary = "mock"
[payment.implementations.mock]
"#;

	fn factories() -> EscrowFactories<StorageFactory, PaymentProviderFactory> {
		EscrowFactories {
			storage_factories: escrow_storage::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
			payment_factories: escrow_payment::get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[tokio::test]
	async fn test_builds_from_registered_implementations() {
		let config: Config = CONFIG.parse().unwrap();
		let engine = EscrowBuilder::new(config).build(factories()).unwrap();
		assert_eq!(engine.config().engine.id, "builder-test");
	}

	#[test]
	fn test_missing_primary_payment_provider() {
		let mut config: Config = CONFIG.parse().unwrap();
		config.payment.primary = "paystack".into();
		let err = EscrowBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::MissingComponent(_)));
	}

	#[test]
	fn test_invalid_reference_format_rejected() {
		let mut config: Config = CONFIG.parse().unwrap();
		config
			.payment
			.reference_formats
			.insert("usdt".into(), "([".into());
		let err = EscrowBuilder::new(config).build(factories()).err().unwrap();
		assert!(matches!(err, BuilderError::Config(_)));
	}
}
