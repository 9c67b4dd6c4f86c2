//! Payment method and payment reference types.

use crate::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of fiat payment rail a payment method uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethodKind {
	BankTransfer,
	MobileMoney,
	Paystack,
	Usdt,
	Cash,
	Other,
}

impl PaymentMethodKind {
	/// Returns the configuration name of this kind.
	pub fn as_str(&self) -> &'static str {
		match self {
			PaymentMethodKind::BankTransfer => "bank_transfer",
			PaymentMethodKind::MobileMoney => "mobile_money",
			PaymentMethodKind::Paystack => "paystack",
			PaymentMethodKind::Usdt => "usdt",
			PaymentMethodKind::Cash => "cash",
			PaymentMethodKind::Other => "other",
		}
	}

	/// Returns an iterator over all kinds.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::BankTransfer,
			Self::MobileMoney,
			Self::Paystack,
			Self::Usdt,
			Self::Cash,
			Self::Other,
		]
		.into_iter()
	}
}

impl fmt::Display for PaymentMethodKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for PaymentMethodKind {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|kind| kind.as_str() == s).ok_or(())
	}
}

/// A way a party accepts or sends fiat, owned by that party.
///
/// Payment methods are never deleted. Removing one flips `is_active` so that
/// orders created against it keep a valid reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethod {
	pub id: String,
	pub owner: Identity,
	pub kind: PaymentMethodKind,
	pub label: String,
	/// Rail-specific details (account number, phone, wallet address).
	#[serde(default)]
	pub details: serde_json::Value,
	pub is_active: bool,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

/// A payment reference that passed shape validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentReference(String);

impl PaymentReference {
	/// Wraps an already validated reference.
	///
	/// Only the payment binding should call this; everything else receives a
	/// `PaymentReference` from it.
	pub fn new_unchecked(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	pub fn into_inner(self) -> String {
		self.0
	}
}

impl fmt::Display for PaymentReference {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
