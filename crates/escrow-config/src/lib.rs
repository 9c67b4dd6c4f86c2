//! Configuration module for the P2P escrow system.
//!
//! This module provides structures and utilities for managing escrow engine
//! configuration. It supports loading configuration from TOML files and
//! validates every section before the engine is built.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

use escrow_types::PaymentMethodKind;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Key in `[payment.reference_formats]` overriding the pattern used when an
/// order has no payment method bound.
pub const DEFAULT_REFERENCE_FORMAT_KEY: &str = "default";

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the escrow engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Engine identity and order lifecycle timing.
	pub engine: EngineConfig,
	/// Configuration for the storage backend.
	pub storage: StorageConfig,
	/// Payment provider and payment reference formats.
	pub payment: PaymentConfig,
	/// Dispute resolution settings.
	#[serde(default)]
	pub dispute: DisputeConfig,
	/// Configuration for the HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Configuration specific to the engine instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
	/// Unique identifier for this engine instance.
	pub id: String,
	/// Minutes a pending order waits for payment before it expires.
	#[serde(default = "default_order_expiry_minutes")]
	pub order_expiry_minutes: u64,
	/// Decimal places kept when deriving the asset amount of an order.
	#[serde(default = "default_asset_decimal_places")]
	pub asset_decimal_places: u32,
	/// Seconds between two runs of the expiry sweeper.
	#[serde(default = "default_sweep_interval_seconds")]
	pub sweep_interval_seconds: u64,
}

fn default_order_expiry_minutes() -> u64 {
	30
}

fn default_asset_decimal_places() -> u32 {
	8
}

fn default_sweep_interval_seconds() -> u64 {
	30
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for payment handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PaymentConfig {
	/// Which payment provider implementation to use as primary.
	pub primary: String,
	/// Map of payment provider names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Regex overrides for payment reference shapes, keyed by payment method
	/// kind (`bank_transfer`, `usdt`, ...) or `default`.
	#[serde(default)]
	pub reference_formats: HashMap<String, String>,
}

/// Dispute resolution settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DisputeConfig {
	/// Identities allowed to resolve disputes. Empty means any identity that
	/// is not a party to the disputed order.
	#[serde(default)]
	pub resolvers: Vec<String>,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Request timeout in seconds.
	#[serde(default = "default_api_timeout")]
	pub timeout_seconds: u64,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// Header carrying the caller identity, set by a trusted upstream
	/// authentication proxy.
	#[serde(default = "default_identity_header")]
	pub identity_header: String,
	/// CORS configuration.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
	/// Allowed headers for CORS.
	pub allowed_headers: Vec<String>,
	/// Allowed methods for CORS.
	pub allowed_methods: Vec<String>,
}

/// Returns the default API host.
fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

/// Returns the default API port.
fn default_api_port() -> u16 {
	3000
}

/// Returns the default API timeout in seconds.
fn default_api_timeout() -> u64 {
	30
}

/// Returns the default maximum request size in bytes.
fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

fn default_identity_header() -> String {
	"x-escrow-identity".to_string()
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024; // 1MB
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = input.to_string();
	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => {
				if let Some(default) = default_value {
					default.to_string()
				} else {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)));
				}
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file with async environment variable resolution.
	///
	/// This method supports modular configuration through include directives:
	/// - `include = ["file1.toml", "file2.toml"]` - Include specific files
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// Every error names the offending field.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.engine.id.is_empty() {
			return Err(ConfigError::Validation("Engine ID cannot be empty".into()));
		}
		if !(1..=1440).contains(&self.engine.order_expiry_minutes) {
			return Err(ConfigError::Validation(format!(
				"engine.order_expiry_minutes must be between 1 and 1440, got {}",
				self.engine.order_expiry_minutes
			)));
		}
		if self.engine.asset_decimal_places > 18 {
			return Err(ConfigError::Validation(format!(
				"engine.asset_decimal_places cannot exceed 18, got {}",
				self.engine.asset_decimal_places
			)));
		}
		if !(1..=3600).contains(&self.engine.sweep_interval_seconds) {
			return Err(ConfigError::Validation(format!(
				"engine.sweep_interval_seconds must be between 1 and 3600, got {}",
				self.engine.sweep_interval_seconds
			)));
		}

		// Validate storage config
		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in storage.implementations",
				self.storage.primary
			)));
		}

		// Validate payment config
		if !self
			.payment
			.implementations
			.contains_key(&self.payment.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary payment provider '{}' not found in payment.implementations",
				self.payment.primary
			)));
		}
		for (kind, pattern) in &self.payment.reference_formats {
			if kind != DEFAULT_REFERENCE_FORMAT_KEY && PaymentMethodKind::from_str(kind).is_err()
			{
				return Err(ConfigError::Validation(format!(
					"payment.reference_formats.{}: unknown payment method kind",
					kind
				)));
			}
			Regex::new(pattern).map_err(|e| {
				ConfigError::Validation(format!(
					"payment.reference_formats.{}: invalid pattern: {}",
					kind, e
				))
			})?;
		}

		if self.dispute.resolvers.iter().any(|r| r.trim().is_empty()) {
			return Err(ConfigError::Validation(
				"dispute.resolvers cannot contain empty identities".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.identity_header.trim().is_empty() {
				return Err(ConfigError::Validation(
					"api.identity_header cannot be empty".into(),
				));
			}
			if api.timeout_seconds == 0 {
				return Err(ConfigError::Validation(
					"api.timeout_seconds must be greater than 0".into(),
				));
			}
		}

		Ok(())
	}
}

/// Implementation of FromStr trait for Config to enable parsing from string.
///
/// Environment variables are resolved and the configuration is automatically
/// validated after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
