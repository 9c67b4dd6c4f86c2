//! Storage-related types for the escrow system.

use std::str::FromStr;

/// Storage keys for different data collections.
///
/// This enum provides type safety for storage operations by replacing
/// string literals with strongly typed variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Key for storing offers
	Offers,
	/// Key for storing orders
	Orders,
	/// Key for storing dispute records
	Disputes,
	/// Key for mapping an order ID to its single open dispute ID
	OpenDisputes,
	/// Key for storing payment methods
	PaymentMethods,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Offers => "offers",
			StorageKey::Orders => "orders",
			StorageKey::Disputes => "disputes",
			StorageKey::OpenDisputes => "open_disputes",
			StorageKey::PaymentMethods => "payment_methods",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Offers,
			Self::Orders,
			Self::Disputes,
			Self::OpenDisputes,
			Self::PaymentMethods,
		]
		.into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all().find(|key| key.as_str() == s).ok_or(())
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}
