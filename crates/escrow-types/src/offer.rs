//! Offer types for the escrow system.
//!
//! An offer is a standing, reusable intent to buy or sell an asset at a
//! stated unit price within fiat amount bounds. Orders are created against
//! offers and copy the price at creation time.

use crate::Identity;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side of the trade the offer owner takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferDirection {
	/// The owner buys the asset and pays fiat.
	Buy,
	/// The owner sells the asset and receives fiat.
	Sell,
}

/// Publication status of an offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OfferStatus {
	Active,
	Paused,
	Completed,
	Cancelled,
}

impl OfferStatus {
	/// Completed and cancelled offers never come back.
	pub fn is_final(&self) -> bool {
		matches!(self, OfferStatus::Completed | OfferStatus::Cancelled)
	}
}

impl fmt::Display for OfferStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OfferStatus::Active => write!(f, "active"),
			OfferStatus::Paused => write!(f, "paused"),
			OfferStatus::Completed => write!(f, "completed"),
			OfferStatus::Cancelled => write!(f, "cancelled"),
		}
	}
}

/// A standing trade intent owned by one party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Offer {
	/// Unique identifier for this offer.
	pub id: String,
	/// Party that published the offer.
	pub owner: Identity,
	/// Which side of the trade the owner takes.
	pub direction: OfferDirection,
	/// Asset being traded (e.g. "BLURT").
	pub asset: String,
	/// Fiat currency the price is quoted in (e.g. "NGN").
	pub fiat_currency: String,
	/// Fiat price of one unit of the asset.
	pub price: Decimal,
	/// Smallest fiat amount a single order may use.
	pub min_amount: Decimal,
	/// Largest fiat amount a single order may use.
	pub max_amount: Decimal,
	/// Payment methods (owned by `owner`) accepted for this offer.
	#[serde(default)]
	pub payment_method_ids: Vec<String>,
	/// Free-text trading terms shown to takers.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub terms: Option<String>,
	pub status: OfferStatus,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Offer {
	/// Returns `(buyer, seller)` for an order taken by `taker`.
	pub fn counterparties(&self, taker: &Identity) -> (Identity, Identity) {
		match self.direction {
			OfferDirection::Sell => (taker.clone(), self.owner.clone()),
			OfferDirection::Buy => (self.owner.clone(), taker.clone()),
		}
	}

	/// Checks whether a fiat amount falls within `[min_amount, max_amount]`.
	pub fn accepts_amount(&self, fiat_amount: Decimal) -> bool {
		fiat_amount >= self.min_amount && fiat_amount <= self.max_amount
	}
}

/// Validates offer pricing terms.
///
/// Returns a human-readable reason on failure.
pub fn validate_offer_terms(
	price: Decimal,
	min_amount: Decimal,
	max_amount: Decimal,
) -> Result<(), String> {
	if price <= Decimal::ZERO {
		return Err(format!("price must be greater than zero, got {}", price));
	}
	if min_amount <= Decimal::ZERO {
		return Err(format!(
			"minimum amount must be greater than zero, got {}",
			min_amount
		));
	}
	if min_amount > max_amount {
		return Err(format!(
			"minimum amount {} exceeds maximum amount {}",
			min_amount, max_amount
		));
	}
	Ok(())
}
