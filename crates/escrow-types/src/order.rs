//! Order types for the escrow system.
//!
//! An order is one escrowed trade bound to exactly one offer. Its status is
//! only ever changed through the transition table enforced by the core
//! engine, and every accepted change is recorded in `history`.

use crate::Identity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
	/// Created, waiting for the buyer to pay.
	Pending,
	/// Buyer claims the fiat payment was made.
	Paid,
	/// Seller affirmed delivery of the asset.
	Released,
	/// Abandoned by a party or decided in the buyer's favour.
	Cancelled,
	/// Held while an external resolver adjudicates.
	Disputed,
	/// Payment deadline passed while still pending.
	Expired,
}

impl OrderStatus {
	/// Terminal orders are immutable.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Released | OrderStatus::Cancelled | OrderStatus::Expired
		)
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "pending",
			OrderStatus::Paid => "paid",
			OrderStatus::Released => "released",
			OrderStatus::Cancelled => "cancelled",
			OrderStatus::Disputed => "disputed",
			OrderStatus::Expired => "expired",
		}
	}

	/// Verb naming the operation that leads into this status.
	pub fn transition_verb(&self) -> &'static str {
		match self {
			OrderStatus::Pending => "create",
			OrderStatus::Paid => "mark paid",
			OrderStatus::Released => "release",
			OrderStatus::Cancelled => "cancel",
			OrderStatus::Disputed => "dispute",
			OrderStatus::Expired => "expire",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Who caused a status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "identity", rename_all = "lowercase")]
pub enum Actor {
	/// The buyer or the seller of the order.
	Party(Identity),
	/// An external dispute resolver.
	Resolver(Identity),
	/// The engine itself (expiry).
	System,
}

impl fmt::Display for Actor {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Actor::Party(identity) => write!(f, "party:{}", identity),
			Actor::Resolver(identity) => write!(f, "resolver:{}", identity),
			Actor::System => write!(f, "system"),
		}
	}
}

/// One entry of an order's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
	/// Previous status, `None` for creation.
	pub from: Option<OrderStatus>,
	pub to: OrderStatus,
	pub actor: Actor,
	pub at: DateTime<Utc>,
}

/// Role a party plays in an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
	Buyer,
	Seller,
}

/// One escrowed trade instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Offer this order was created against.
	pub offer_id: String,
	pub buyer: Identity,
	pub seller: Identity,
	pub asset: String,
	pub fiat_currency: String,
	/// Unit price copied from the offer at creation; never changes afterwards.
	pub price: Decimal,
	/// `fiat_amount / price`, frozen at creation.
	pub asset_amount: Decimal,
	pub fiat_amount: Decimal,
	pub status: OrderStatus,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment_method_id: Option<String>,
	/// Bound by `mark_paid`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment_reference: Option<String>,
	/// Deadline for the buyer to mark the order paid.
	pub expires_at: DateTime<Utc>,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
	/// Number of accepted status changes, creation included.
	pub sequence: u64,
	/// Full transition history, oldest first.
	#[serde(default)]
	pub history: Vec<StatusChange>,
}

impl Order {
	/// Returns the role of `identity` in this order, if any.
	pub fn role_of(&self, identity: &Identity) -> Option<PartyRole> {
		if &self.buyer == identity {
			Some(PartyRole::Buyer)
		} else if &self.seller == identity {
			Some(PartyRole::Seller)
		} else {
			None
		}
	}

	pub fn is_party(&self, identity: &Identity) -> bool {
		self.role_of(identity).is_some()
	}

	/// A pending order whose deadline has been reached.
	pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
		self.status == OrderStatus::Pending && now >= self.expires_at
	}
}
