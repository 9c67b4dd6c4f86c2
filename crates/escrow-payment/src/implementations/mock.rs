//! Mock payment provider for testing and development.
//!
//! Issues random references without contacting any payment rail.

use crate::{
	PaymentError, PaymentProviderFactory, PaymentProviderInterface, PaymentProviderRegistry,
	PaymentRequest,
};
use async_trait::async_trait;
use escrow_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, PaymentReference, Schema,
	ValidationError,
};
use uuid::Uuid;

const DEFAULT_PREFIX: &str = "mock";

/// Configuration schema for the mock provider.
pub struct MockPaymentSchema;

impl ConfigSchema for MockPaymentSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("reference_prefix", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(prefix)
							if prefix.is_empty()
								|| !prefix.chars().all(|c| c.is_ascii_alphanumeric()) =>
						{
							Err("reference_prefix must be non-empty and alphanumeric".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Payment provider returning `"{prefix}-{uuid}"` references.
pub struct MockPaymentProvider {
	prefix: String,
}

impl MockPaymentProvider {
	pub fn new(prefix: String) -> Self {
		Self { prefix }
	}
}

#[async_trait]
impl PaymentProviderInterface for MockPaymentProvider {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MockPaymentSchema)
	}

	async fn initiate(&self, _request: &PaymentRequest) -> Result<PaymentReference, PaymentError> {
		Ok(PaymentReference::new_unchecked(format!(
			"{}-{}",
			self.prefix,
			Uuid::new_v4().simple()
		)))
	}
}

/// Factory function to create a mock provider from configuration.
///
/// Configuration parameters:
/// - `reference_prefix`: prefix of issued references (default: "mock")
pub fn create_provider(
	config: &toml::Value,
) -> Result<Box<dyn PaymentProviderInterface>, PaymentError> {
	MockPaymentSchema
		.validate(config)
		.map_err(|e| PaymentError::Configuration(e.to_string()))?;

	let prefix = config
		.get("reference_prefix")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_PREFIX);

	Ok(Box::new(MockPaymentProvider::new(prefix.to_string())))
}

/// Registry for the mock payment provider.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mock";
	type Factory = PaymentProviderFactory;

	fn factory() -> Self::Factory {
		create_provider
	}
}

impl PaymentProviderRegistry for Registry {}
