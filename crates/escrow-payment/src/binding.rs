//! Payment reference shape validation.
//!
//! Each payment method kind has its own reference pattern; orders without a
//! bound payment method use the default pattern. Patterns can be overridden
//! per kind from configuration.

use crate::PaymentError;
use escrow_types::{PaymentMethodKind, PaymentReference};
use regex::Regex;
use std::collections::HashMap;

/// Configuration key overriding the default pattern.
pub const DEFAULT_FORMAT_KEY: &str = "default";

const DEFAULT_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9._:/-]{2,127}$";

fn builtin_pattern(kind: PaymentMethodKind) -> Option<&'static str> {
	match kind {
		PaymentMethodKind::BankTransfer => Some(r"^[A-Za-z0-9][A-Za-z0-9/-]{3,63}$"),
		PaymentMethodKind::MobileMoney => Some(r"^[A-Za-z0-9]{6,32}$"),
		PaymentMethodKind::Paystack => Some(r"^[A-Za-z0-9][A-Za-z0-9._=-]{5,99}$"),
		// transaction hash
		PaymentMethodKind::Usdt => Some(r"^(0x)?[0-9a-fA-F]{64}$"),
		PaymentMethodKind::Cash | PaymentMethodKind::Other => None,
	}
}

fn compile(name: &str, pattern: &str) -> Result<Regex, PaymentError> {
	Regex::new(pattern).map_err(|e| {
		PaymentError::Configuration(format!("invalid reference format for {}: {}", name, e))
	})
}

/// Validates payment references against per-kind patterns.
#[derive(Debug, Clone)]
pub struct PaymentBinding {
	default: Regex,
	by_kind: HashMap<PaymentMethodKind, Regex>,
}

impl PaymentBinding {
	/// Builds the binding from built-in patterns plus `overrides`, keyed by
	/// kind name or [`DEFAULT_FORMAT_KEY`].
	///
	/// Kinds without a built-in pattern or override fall back to the default
	/// pattern, including an overridden default.
	pub fn from_formats(overrides: &HashMap<String, String>) -> Result<Self, PaymentError> {
		for key in overrides.keys() {
			if key != DEFAULT_FORMAT_KEY && key.parse::<PaymentMethodKind>().is_err() {
				return Err(PaymentError::Configuration(format!(
					"unknown payment method kind '{}' in reference formats",
					key
				)));
			}
		}

		let default_pattern = overrides
			.get(DEFAULT_FORMAT_KEY)
			.map(String::as_str)
			.unwrap_or(DEFAULT_PATTERN);
		let default = compile(DEFAULT_FORMAT_KEY, default_pattern)?;

		let mut by_kind = HashMap::new();
		for kind in PaymentMethodKind::all() {
			let pattern = overrides
				.get(kind.as_str())
				.map(String::as_str)
				.or_else(|| builtin_pattern(kind));
			if let Some(pattern) = pattern {
				by_kind.insert(kind, compile(kind.as_str(), pattern)?);
			}
		}

		Ok(Self { default, by_kind })
	}

	/// Checks a submitted reference for the given payment method kind.
	///
	/// Surrounding whitespace is ignored; the trimmed reference is returned.
	pub fn validate(
		&self,
		reference: &str,
		kind: Option<PaymentMethodKind>,
	) -> Result<PaymentReference, PaymentError> {
		let reference = reference.trim();
		if reference.is_empty() {
			return Err(PaymentError::InvalidReference(
				"payment reference is empty".into(),
			));
		}

		let pattern = kind
			.and_then(|kind| self.by_kind.get(&kind))
			.unwrap_or(&self.default);
		if !pattern.is_match(reference) {
			let format = kind.map(|k| k.as_str()).unwrap_or(DEFAULT_FORMAT_KEY);
			return Err(PaymentError::InvalidReference(format!(
				"'{}' does not match the {} reference format",
				reference, format
			)));
		}

		Ok(PaymentReference::new_unchecked(reference))
	}
}
