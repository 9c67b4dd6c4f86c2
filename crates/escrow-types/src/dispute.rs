//! Dispute types for the escrow system.

use crate::{Identity, OrderStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Whether a dispute still holds its order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisputeStatus {
	Open,
	Resolved,
}

/// Decision handed down by an external resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeOutcome {
	/// The seller keeps the fiat; the order is released.
	FavorSeller,
	/// The buyer is made whole; the order is cancelled.
	FavorBuyer,
}

impl DisputeOutcome {
	/// Terminal order status implied by this outcome.
	pub fn target_status(&self) -> OrderStatus {
		match self {
			DisputeOutcome::FavorSeller => OrderStatus::Released,
			DisputeOutcome::FavorBuyer => OrderStatus::Cancelled,
		}
	}
}

/// An out-of-band hold placed on an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dispute {
	pub id: String,
	pub order_id: String,
	/// Party that opened the dispute.
	pub raised_by: Identity,
	pub reason: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	pub status: DisputeStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub outcome: Option<DisputeOutcome>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved_by: Option<Identity>,
	/// Resolver notes recorded with the decision.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolution_notes: Option<String>,
	pub created_at: DateTime<Utc>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub resolved_at: Option<DateTime<Utc>>,
}

impl Dispute {
	pub fn is_open(&self) -> bool {
		self.status == DisputeStatus::Open
	}
}
