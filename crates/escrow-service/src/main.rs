//! Main entry point for the escrow service.
//!
//! Runs the order lifecycle engine with its periodic expiry sweep and, when
//! enabled, the HTTP API in front of it. Storage backends and payment
//! providers are chosen by name from the configuration.

use clap::Parser;
use escrow_config::Config;
use escrow_core::{EscrowBuilder, EscrowEngine, EscrowFactories};
use std::path::PathBuf;
use std::sync::Arc;

mod apis;
mod identity;
mod server;

use escrow_payment::implementations::mock::create_provider as create_mock_provider;
use escrow_storage::implementations::file::create_storage as create_file_storage;
use escrow_storage::implementations::memory::create_storage as create_memory_storage;

/// Command-line arguments for the escrow service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/escrow.toml", env = "ESCROW_CONFIG")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started escrow service");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.engine.id);

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped escrow service");
	Ok(())
}

/// Macro to create a factory HashMap with the appropriate type aliases
macro_rules! create_factory_map {
	($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
		let mut factories = std::collections::HashMap::new();
		$(
			factories.insert(
				$name.to_string(),
				$factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
			);
		)*
		factories
	}};
}

/// Builds the escrow engine with every known storage backend and payment
/// provider.
fn build_engine(config: Config) -> Result<EscrowEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		escrow_storage::StorageInterface,
		escrow_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	let payment_factories = create_factory_map!(
		escrow_payment::PaymentProviderInterface,
		escrow_payment::PaymentError,
		"mock" => create_mock_provider,
	);

	let factories = EscrowFactories {
		storage_factories,
		payment_factories,
	};

	Ok(EscrowBuilder::new(config).build(factories)?)
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;

	const MINIMAL: &str = r#"
[engine]
id = "test-escrow"

[storage]
primary = "memory"
[storage.implementations.memory]

[payment]
primary = "mock"
[payment.implementations.mock]
"#;

	#[test]
	fn test_args_defaults() {
		let args = Args::parse_from(["escrow"]);
		assert_eq!(args.config, PathBuf::from("config/escrow.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["escrow", "--config", "custom.toml", "-l", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_create_factory_map_multiple_entries() {
		let factories = create_factory_map!(
			escrow_storage::StorageInterface,
			escrow_storage::StorageError,
			"memory" => create_memory_storage,
			"file" => create_file_storage,
		);

		assert_eq!(factories.len(), 2);
		assert!(factories.contains_key("memory"));
		assert!(factories.contains_key("file"));
	}

	#[tokio::test]
	async fn test_sample_config_loads() {
		let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../../config/escrow.toml");
		let config = Config::from_file(path).await.unwrap();
		assert_eq!(config.storage.primary, "file");
		assert_eq!(config.dispute.resolvers, vec!["support-admin".to_string()]);
		assert!(config.api.is_some_and(|api| api.enabled));
	}

	#[test]
	fn test_build_engine_with_minimal_config() {
		let config: Config = MINIMAL.parse().unwrap();
		let engine = build_engine(config).unwrap();
		assert_eq!(engine.config().engine.id, "test-escrow");
		assert_eq!(engine.config().engine.order_expiry_minutes, 30);
	}

	#[tokio::test]
	async fn test_build_engine_with_file_storage() {
		let dir = tempdir().unwrap();
		let config_path = dir.path().join("escrow.toml");
		let data_path = dir.path().join("data");
		let contents = format!(
			r#"
[engine]
id = "file-escrow"
order_expiry_minutes = 15

[storage]
primary = "file"
[storage.implementations.file]
storage_path = "{}"

[payment]
primary = "mock"
[payment.implementations.mock]
reference_prefix = "esc"
"#,
			data_path.display()
		);
		std::fs::write(&config_path, contents).unwrap();

		let config = Config::from_file(config_path.to_str().unwrap())
			.await
			.unwrap();
		let engine = build_engine(config).unwrap();
		assert_eq!(engine.config().engine.order_expiry_minutes, 15);
		assert!(data_path.exists());
	}
}
