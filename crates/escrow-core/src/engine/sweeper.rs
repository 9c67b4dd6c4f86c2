//! Expiry sweep.

use super::EscrowEngine;
use crate::error::EscrowError;
use crate::state::OrderStateError;
use chrono::{DateTime, Utc};
use escrow_types::{truncate_id, Actor, OrderStatus};
use tracing::instrument;

impl EscrowEngine {
	/// Moves every pending order whose deadline is at or before `now` to
	/// `expired`. Returns how many orders this sweep expired.
	///
	/// Paid, disputed and terminal orders are never touched. An order moved
	/// by a party while the sweep runs is skipped.
	#[instrument(skip_all, fields(now = %now))]
	pub async fn expire_sweep(&self, now: DateTime<Utc>) -> Result<usize, EscrowError> {
		let overdue: Vec<_> = self
			.state_machine
			.list_orders()
			.await?
			.into_iter()
			.filter(|order| order.is_overdue(now))
			.collect();

		tracing::debug!(candidates = overdue.len(), "Running expiry sweep");

		let mut expired = 0;
		for order in overdue {
			match self
				.state_machine
				.transition(
					&order.id,
					OrderStatus::Pending,
					OrderStatus::Expired,
					Actor::System,
					|_| {},
				)
				.await
			{
				Ok(_) => expired += 1,
				Err(OrderStateError::Conflict { found, .. }) => {
					tracing::debug!(
						order_id = %truncate_id(&order.id),
						status = %found,
						"Order moved before the sweep reached it"
					);
				},
				Err(e) => return Err(e.into()),
			}
		}

		Ok(expired)
	}
}
