//! Payment module for the P2P escrow system.
//!
//! Two concerns live here. [`binding::PaymentBinding`] checks the shape of a
//! payment reference a buyer submits when marking an order paid. Payment
//! providers issue references for buyers who want one generated; they follow
//! the same trait/registry pattern as storage backends. Neither verifies that
//! money actually moved.

use async_trait::async_trait;
use escrow_types::{ConfigSchema, Identity, ImplementationRegistry, PaymentReference};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

pub mod binding;

pub use binding::PaymentBinding;

/// Re-export implementations
pub mod implementations {
	pub mod mock;
}

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
	/// The reference is empty or does not match the expected format.
	#[error("Invalid payment reference: {0}")]
	InvalidReference(String),
	/// The payment provider failed to issue a reference.
	#[error("Provider error: {0}")]
	Provider(String),
	/// Error that occurs when configuration is invalid.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// What a provider needs to issue a payment reference.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
	pub order_id: String,
	/// Fiat amount the buyer owes.
	pub amount: Decimal,
	pub fiat_currency: String,
	/// Buyer who will pay.
	pub payer: Identity,
}

/// Trait defining the interface for payment providers.
#[async_trait]
pub trait PaymentProviderInterface: Send + Sync {
	/// Returns the configuration schema for this provider.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Issues a reference the buyer quotes when paying.
	async fn initiate(&self, request: &PaymentRequest) -> Result<PaymentReference, PaymentError>;
}

/// Type alias for payment provider factory functions.
pub type PaymentProviderFactory =
	fn(&toml::Value) -> Result<Box<dyn PaymentProviderInterface>, PaymentError>;

/// Registry trait for payment provider implementations.
pub trait PaymentProviderRegistry: ImplementationRegistry<Factory = PaymentProviderFactory> {}

/// Get all registered payment provider implementations.
pub fn get_all_implementations() -> Vec<(&'static str, PaymentProviderFactory)> {
	use implementations::mock;

	vec![(mock::Registry::NAME, mock::Registry::factory())]
}

/// Service that routes payment initiation to the primary provider.
pub struct PaymentService {
	/// Map of implementation names to their interfaces.
	implementations: HashMap<String, Arc<dyn PaymentProviderInterface>>,
	/// The implementation used to issue references.
	primary_implementation: String,
}

impl PaymentService {
	/// Creates a new PaymentService with the given implementations.
	pub fn new(
		implementations: HashMap<String, Arc<dyn PaymentProviderInterface>>,
		primary_implementation: String,
	) -> Result<Self, PaymentError> {
		if !implementations.contains_key(&primary_implementation) {
			return Err(PaymentError::Configuration(format!(
				"Primary implementation '{}' not found in available implementations",
				primary_implementation
			)));
		}

		Ok(Self {
			implementations,
			primary_implementation,
		})
	}

	/// Issues a payment reference through the primary provider.
	pub async fn initiate(
		&self,
		request: &PaymentRequest,
	) -> Result<PaymentReference, PaymentError> {
		let implementation = self
			.implementations
			.get(&self.primary_implementation)
			.ok_or_else(|| {
				PaymentError::Configuration(format!(
					"Primary implementation '{}' not available",
					self.primary_implementation
				))
			})?;

		let reference = implementation.initiate(request).await?;
		tracing::debug!(
			order_id = %escrow_types::truncate_id(&request.order_id),
			provider = %self.primary_implementation,
			"Issued payment reference"
		);
		Ok(reference)
	}
}
