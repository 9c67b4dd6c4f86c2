//! Dispute subsystem.
//!
//! At most one dispute is open per order. The invariant is held by an
//! insert-if-absent on the `open_disputes` marker keyed by order ID, which
//! points at the open dispute's ID and is cleared on resolution.

use crate::clock::Clock;
use escrow_storage::{StorageError, StorageService, Versioned};
use escrow_types::{
	truncate_id, Dispute, DisputeOutcome, DisputeStatus, Identity, StorageKey,
};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DisputeError {
	#[error("A dispute is already open on order {0}")]
	AlreadyOpen(String),
	#[error("Dispute not found: {0}")]
	NotFound(String),
	#[error("Dispute already resolved: {0}")]
	AlreadyResolved(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<StorageError> for DisputeError {
	fn from(err: StorageError) -> Self {
		DisputeError::Storage(err.to_string())
	}
}

pub struct DisputeService {
	storage: Arc<StorageService>,
	clock: Arc<dyn Clock>,
}

impl DisputeService {
	pub fn new(storage: Arc<StorageService>, clock: Arc<dyn Clock>) -> Self {
		Self { storage, clock }
	}

	/// Opens a dispute on an order.
	///
	/// Fails with `AlreadyOpen` while another dispute on the order is open.
	pub async fn open(
		&self,
		order_id: &str,
		raised_by: &Identity,
		reason: &str,
		description: Option<String>,
	) -> Result<Dispute, DisputeError> {
		let dispute = Dispute {
			id: Uuid::new_v4().to_string(),
			order_id: order_id.to_string(),
			raised_by: raised_by.clone(),
			reason: reason.to_string(),
			description,
			status: DisputeStatus::Open,
			outcome: None,
			resolved_by: None,
			resolution_notes: None,
			created_at: self.clock.now(),
			resolved_at: None,
		};

		match self
			.storage
			.insert_if_absent(StorageKey::OpenDisputes.as_str(), order_id, &dispute.id)
			.await
		{
			Ok(_) => {},
			Err(StorageError::Conflict(_)) => {
				return Err(DisputeError::AlreadyOpen(order_id.to_string()))
			},
			Err(e) => return Err(e.into()),
		}

		if let Err(e) = self
			.storage
			.store(StorageKey::Disputes.as_str(), &dispute.id, &dispute)
			.await
		{
			self.clear_marker(order_id, &dispute.id).await;
			return Err(e.into());
		}

		tracing::info!(
			order_id = %truncate_id(order_id),
			dispute_id = %truncate_id(&dispute.id),
			"Dispute opened"
		);
		Ok(dispute)
	}

	/// Records the resolver's decision on an open dispute.
	pub async fn resolve(
		&self,
		dispute_id: &str,
		resolver: &Identity,
		outcome: DisputeOutcome,
		notes: Option<String>,
	) -> Result<Dispute, DisputeError> {
		let Versioned {
			value: mut dispute,
			revision,
		} = self.load_versioned(dispute_id).await?;

		if !dispute.is_open() {
			return Err(DisputeError::AlreadyResolved(dispute_id.to_string()));
		}

		dispute.status = DisputeStatus::Resolved;
		dispute.outcome = Some(outcome);
		dispute.resolved_by = Some(resolver.clone());
		dispute.resolution_notes = notes;
		dispute.resolved_at = Some(self.clock.now());

		match self
			.storage
			.update_if_unchanged(StorageKey::Disputes.as_str(), dispute_id, &revision, &dispute)
			.await
		{
			Ok(_) => {},
			Err(StorageError::Conflict(_)) => {
				return Err(DisputeError::AlreadyResolved(dispute_id.to_string()))
			},
			Err(e) => return Err(e.into()),
		}

		self.clear_marker(&dispute.order_id, dispute_id).await;

		tracing::info!(
			order_id = %truncate_id(&dispute.order_id),
			dispute_id = %truncate_id(dispute_id),
			outcome = ?outcome,
			"Dispute resolved"
		);
		Ok(dispute)
	}

	/// Removes a dispute that never took hold on its order.
	pub async fn withdraw(&self, dispute_id: &str) -> Result<(), DisputeError> {
		let dispute = self.get(dispute_id).await?;
		self.storage
			.remove(StorageKey::Disputes.as_str(), dispute_id)
			.await?;
		self.clear_marker(&dispute.order_id, dispute_id).await;
		tracing::debug!(
			order_id = %truncate_id(&dispute.order_id),
			dispute_id = %truncate_id(dispute_id),
			"Dispute withdrawn"
		);
		Ok(())
	}

	/// Returns the open dispute of an order, if any.
	pub async fn open_for_order(&self, order_id: &str) -> Result<Option<Dispute>, DisputeError> {
		let dispute_id: String = match self
			.storage
			.retrieve(StorageKey::OpenDisputes.as_str(), order_id)
			.await
		{
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e.into()),
		};

		match self.get(&dispute_id).await {
			Ok(dispute) if dispute.is_open() => Ok(Some(dispute)),
			// marker outlived its dispute
			Ok(_) | Err(DisputeError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	pub async fn get(&self, dispute_id: &str) -> Result<Dispute, DisputeError> {
		Ok(self.load_versioned(dispute_id).await?.value)
	}

	async fn load_versioned(&self, dispute_id: &str) -> Result<Versioned<Dispute>, DisputeError> {
		self.storage
			.retrieve_versioned(StorageKey::Disputes.as_str(), dispute_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => DisputeError::NotFound(dispute_id.to_string()),
				other => other.into(),
			})
	}

	/// Clears the open marker of `order_id` if it still points at
	/// `dispute_id`. Failures are logged, a stale marker is ignored by
	/// [`Self::open_for_order`] but blocks new disputes on the order.
	async fn clear_marker(&self, order_id: &str, dispute_id: &str) {
		let marker = self
			.storage
			.retrieve_versioned::<String>(StorageKey::OpenDisputes.as_str(), order_id)
			.await;
		let result = match marker {
			Ok(marker) if marker.value == dispute_id => {
				self.storage
					.remove_if_unchanged(StorageKey::OpenDisputes.as_str(), order_id, &marker.revision)
					.await
			},
			Ok(_) | Err(StorageError::NotFound) => Ok(()),
			Err(e) => Err(e),
		};
		if let Err(e) = result {
			tracing::warn!(
				order_id = %truncate_id(order_id),
				dispute_id = %truncate_id(dispute_id),
				error = %e,
				"Failed to clear open dispute marker"
			);
		}
	}
}
