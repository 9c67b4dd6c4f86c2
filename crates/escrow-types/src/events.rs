//! Event types published after accepted order transitions.
//!
//! Events are immutable facts. For any single order, `sequence` increases by
//! one with every accepted transition, so subscribers can detect gaps and
//! order events per order. No total order across orders is implied.

use crate::{Actor, Order, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single accepted status change of one order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionEvent {
	pub order_id: String,
	/// Per-order sequence number; creation is 1.
	pub sequence: u64,
	/// Previous status, `None` for creation.
	pub from: Option<OrderStatus>,
	pub to: OrderStatus,
	pub actor: Actor,
	pub at: DateTime<Utc>,
}

impl TransitionEvent {
	/// Builds the event describing the latest history entry of `order`.
	///
	/// Returns `None` for an order without history.
	pub fn latest(order: &Order) -> Option<Self> {
		order.history.last().map(|change| Self {
			order_id: order.id.clone(),
			sequence: order.sequence,
			from: change.from,
			to: change.to,
			actor: change.actor.clone(),
			at: change.at,
		})
	}

	/// Whether no further events can follow for this order.
	pub fn is_final(&self) -> bool {
		self.to.is_terminal()
	}
}
