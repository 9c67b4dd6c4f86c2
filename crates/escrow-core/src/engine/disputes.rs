//! Dispute operations of the engine.
//!
//! Opening records the dispute first and then moves the order, withdrawing
//! the dispute if the order moved underneath. Resolving moves the order
//! first, so the transition decides the race, and then closes the dispute.
//!
//! Both run on their own task: a caller that stops waiting halfway must not
//! leave an open dispute behind an order that never became disputed.

use super::orders::{check_status, require_role, trace_rejection};
use super::EscrowEngine;
use crate::error::EscrowError;
use escrow_types::{
	truncate_id, Actor, Dispute, DisputeOutcome, Identity, Order, OrderStatus, PartyRole,
};
use std::future::Future;
use tracing::{instrument, Instrument};

impl EscrowEngine {
	/// Opens a dispute on a pending or paid order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn open_dispute(
		&self,
		order_id: &str,
		caller: &Identity,
		reason: &str,
		description: Option<String>,
	) -> Result<(Order, Dispute), EscrowError> {
		let engine = self.clone();
		let order_id = order_id.to_string();
		let caller = caller.clone();
		let reason = reason.to_string();
		let result = run_to_completion(async move {
			engine
				.try_open_dispute(&order_id, &caller, &reason, description)
				.await
		})
		.await;
		trace_rejection("open dispute", &result);
		result
	}

	async fn try_open_dispute(
		&self,
		order_id: &str,
		caller: &Identity,
		reason: &str,
		description: Option<String>,
	) -> Result<(Order, Dispute), EscrowError> {
		let order = self.load_order(order_id).await?;
		require_role(
			&order,
			caller,
			&[PartyRole::Buyer, PartyRole::Seller],
			"you are not a party to this order",
		)?;
		if order.status == OrderStatus::Disputed {
			return Err(EscrowError::Conflict(format!(
				"a dispute is already open on order {}",
				order_id
			)));
		}
		check_status(
			&order,
			&[OrderStatus::Pending, OrderStatus::Paid],
			OrderStatus::Disputed,
		)?;

		let reason = reason.trim();
		if reason.is_empty() {
			return Err(EscrowError::InvalidInput(
				"a dispute needs a reason".into(),
			));
		}
		let description = description.filter(|d| !d.trim().is_empty());

		let dispute = self
			.disputes
			.open(order_id, caller, reason, description)
			.await?;

		let transitioned = self
			.state_machine
			.transition(
				order_id,
				order.status,
				OrderStatus::Disputed,
				Actor::Party(caller.clone()),
				|_| {},
			)
			.await;

		match transitioned {
			Ok(order) => Ok((order, dispute)),
			Err(e) => {
				if let Err(rollback) = self.disputes.withdraw(&dispute.id).await {
					tracing::error!(
						dispute_id = %truncate_id(&dispute.id),
						error = %rollback,
						"Failed to withdraw dispute after losing the order transition"
					);
				}
				Err(e.into())
			},
		}
	}

	/// Applies an external resolver's decision to a disputed order.
	///
	/// The resolver may not be a party to the order. When resolvers are
	/// configured, only they may decide.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), outcome = ?outcome))]
	pub async fn resolve_dispute(
		&self,
		order_id: &str,
		resolver: &Identity,
		outcome: DisputeOutcome,
		notes: Option<String>,
	) -> Result<(Order, Dispute), EscrowError> {
		let engine = self.clone();
		let order_id = order_id.to_string();
		let resolver = resolver.clone();
		let result = run_to_completion(async move {
			engine
				.try_resolve_dispute(&order_id, &resolver, outcome, notes)
				.await
		})
		.await;
		trace_rejection("resolve dispute", &result);
		result
	}

	async fn try_resolve_dispute(
		&self,
		order_id: &str,
		resolver: &Identity,
		outcome: DisputeOutcome,
		notes: Option<String>,
	) -> Result<(Order, Dispute), EscrowError> {
		let order = self.load_order(order_id).await?;
		if order.is_party(resolver) {
			return Err(EscrowError::Forbidden(
				"a party cannot resolve a dispute on its own order".into(),
			));
		}
		if !self.config.dispute.resolvers.is_empty() && !self.is_resolver(resolver) {
			return Err(EscrowError::Forbidden(
				"you are not a dispute resolver".into(),
			));
		}

		let dispute = self
			.disputes
			.open_for_order(order_id)
			.await?
			.ok_or_else(|| {
				EscrowError::NotFound(format!("order {} has no open dispute", order_id))
			})?;
		if order.status != OrderStatus::Disputed {
			// the dispute is recorded but the order has not caught up yet
			return Err(EscrowError::Conflict(format!(
				"order {} is {}, re-fetch and retry",
				order_id, order.status
			)));
		}

		let order = self
			.state_machine
			.transition(
				order_id,
				OrderStatus::Disputed,
				outcome.target_status(),
				Actor::Resolver(resolver.clone()),
				|_| {},
			)
			.await?;

		let notes = notes.filter(|n| !n.trim().is_empty());
		let dispute = match self
			.disputes
			.resolve(&dispute.id, resolver, outcome, notes)
			.await
		{
			Ok(dispute) => dispute,
			Err(e) => {
				tracing::error!(
					dispute_id = %truncate_id(&dispute.id),
					error = %e,
					"Order finalized but dispute record is still open"
				);
				return Err(e.into());
			},
		};

		Ok((order, dispute))
	}
}

/// Runs `work` on a spawned task and waits for it. Dropping the returned
/// future does not stop the work.
async fn run_to_completion<T, F>(work: F) -> Result<T, EscrowError>
where
	F: Future<Output = Result<T, EscrowError>> + Send + 'static,
	T: Send + 'static,
{
	tokio::spawn(work.in_current_span())
		.await
		.map_err(|e| EscrowError::Storage(format!("dispute task failed: {}", e)))?
}
