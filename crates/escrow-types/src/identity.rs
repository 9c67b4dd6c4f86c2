//! Identity of an authenticated party.
//!
//! The escrow engine never authenticates anyone itself. An identity is resolved
//! once per request by an external collaborator and then passed explicitly into
//! every engine call.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque identifier of an authenticated party (buyer, seller or resolver).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(String);

impl Identity {
	/// Creates an identity, returning `None` for blank input.
	pub fn new(value: impl Into<String>) -> Option<Self> {
		let value = value.into();
		let trimmed = value.trim();
		if trimmed.is_empty() {
			return None;
		}
		Some(Self(trimmed.to_string()))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Display for Identity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for Identity {
	fn from(value: &str) -> Self {
		Self(value.to_string())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_blank_identity_rejected() {
		assert!(Identity::new("").is_none());
		assert!(Identity::new("   ").is_none());
		assert_eq!(Identity::new(" alice ").unwrap().as_str(), "alice");
	}

	#[test]
	fn test_serializes_as_plain_string() {
		let json = serde_json::to_string(&Identity::from("bob")).unwrap();
		assert_eq!(json, "\"bob\"");
	}
}
