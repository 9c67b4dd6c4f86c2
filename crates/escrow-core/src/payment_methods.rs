//! Payment method registry.
//!
//! Payment methods belong to one party and are referenced by that party's
//! offers and by orders. They are deactivated rather than deleted.

use crate::clock::Clock;
use crate::error::EscrowError;
use escrow_storage::{StorageError, StorageService, Versioned};
use escrow_types::{truncate_id, CreatePaymentMethodRequest, Identity, PaymentMethod, StorageKey};
use std::sync::Arc;
use uuid::Uuid;

pub struct PaymentMethodRegistry {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
}

impl PaymentMethodRegistry {
	pub fn new(storage: Arc<StorageService>, clock: Arc<dyn Clock>) -> Self {
		Self { storage, clock }
	}

	pub async fn create(
		&self,
		owner: &Identity,
		request: CreatePaymentMethodRequest,
	) -> Result<PaymentMethod, EscrowError> {
		let label = request.label.trim();
		if label.is_empty() {
			return Err(EscrowError::InvalidInput(
				"payment method label cannot be empty".into(),
			));
		}

		let now = self.clock.now();
		let method = PaymentMethod {
			id: Uuid::new_v4().to_string(),
			owner: owner.clone(),
			kind: request.kind,
			label: label.to_string(),
			details: request.details,
			is_active: true,
			created_at: now,
			updated_at: now,
		};
		self.storage
			.insert_if_absent(StorageKey::PaymentMethods.as_str(), &method.id, &method)
			.await?;

		tracing::debug!(
			payment_method_id = %truncate_id(&method.id),
			kind = %method.kind,
			"Payment method created"
		);
		Ok(method)
	}

	pub async fn get(&self, id: &str) -> Result<PaymentMethod, EscrowError> {
		self.storage
			.retrieve(StorageKey::PaymentMethods.as_str(), id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => EscrowError::not_found("payment method", id),
				other => other.into(),
			})
	}

	/// Payment methods of `owner`, active and inactive, newest first.
	pub async fn list_for_owner(&self, owner: &Identity) -> Result<Vec<PaymentMethod>, EscrowError> {
		let mut methods: Vec<PaymentMethod> = self
			.storage
			.list(StorageKey::PaymentMethods.as_str())
			.await?;
		methods.retain(|m| &m.owner == owner);
		methods.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(methods)
	}

	/// Deactivates a payment method. Only its owner may do this.
	///
	/// Deactivating an inactive method is a no-op.
	pub async fn deactivate(&self, id: &str, caller: &Identity) -> Result<PaymentMethod, EscrowError> {
		let Versioned {
			value: mut method,
			revision,
		} = self
			.storage
			.retrieve_versioned::<PaymentMethod>(StorageKey::PaymentMethods.as_str(), id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => EscrowError::not_found("payment method", id),
				other => other.into(),
			})?;

		if &method.owner != caller {
			return Err(EscrowError::Forbidden(
				"only the owner can deactivate a payment method".into(),
			));
		}
		if !method.is_active {
			return Ok(method);
		}

		method.is_active = false;
		method.updated_at = self.clock.now();
		self.storage
			.update_if_unchanged(StorageKey::PaymentMethods.as_str(), id, &revision, &method)
			.await?;
		Ok(method)
	}
}
