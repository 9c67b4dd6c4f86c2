//! File-based storage backend for the escrow service.
//!
//! Layout on disk is one JSON document per record:
//! `<storage_path>/<namespace>/<id>.json`. Writes go to a temp file that is
//! renamed over the target, so readers never observe a partial record.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use escrow_types::{ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError};
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;

const LOCK_FILE: &str = ".escrow.lock";
const RECORD_EXTENSION: &str = "json";

/// File-based storage implementation.
///
/// The base directory is claimed with an exclusive advisory lock for the
/// lifetime of the instance. Compare-and-swap is atomic only because every
/// mutation goes through `write_lock` and no other process may use the
/// directory.
pub struct FileStorage {
	/// Base directory path for storing files.
	base_path: PathBuf,
	/// Serializes all mutations within this process.
	write_lock: Mutex<()>,
	/// Held open to keep the directory lock.
	_lock_file: File,
}

impl FileStorage {
	/// Opens (creating if needed) a storage directory and locks it.
	pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let base_path = base_path.into();
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StorageError::Backend(format!(
				"cannot create storage directory {}: {}",
				base_path.display(),
				e
			))
		})?;

		let lock_file = File::create(base_path.join(LOCK_FILE))
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		lock_file.try_lock_exclusive().map_err(|_| {
			StorageError::Backend(format!(
				"storage directory {} is in use by another process",
				base_path.display()
			))
		})?;

		tracing::debug!(path = %base_path.display(), "Opened file storage");

		Ok(Self {
			base_path,
			write_lock: Mutex::new(()),
			_lock_file: lock_file,
		})
	}

	/// Maps `namespace:id` to its record path.
	///
	/// Path separators in either part are replaced so a key can never escape
	/// the base directory.
	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = key.split_once(':').unwrap_or(("default", key));
		self.base_path
			.join(sanitize(namespace))
			.join(format!("{}.{}", sanitize(id), RECORD_EXTENSION))
	}

	async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	/// Writes via temp file + rename. Caller must hold `write_lock`.
	async fn write_atomic(path: &Path, value: &[u8]) -> Result<(), StorageError> {
		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, value)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	/// Removes a record. Caller must hold `write_lock`.
	async fn remove_file(path: &Path) -> Result<(), StorageError> {
		match fs::remove_file(path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

fn sanitize(part: &str) -> String {
	part.replace(['/', '\\', ':'], "_")
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		Self::read_optional(&self.get_file_path(key))
			.await?
			.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let _guard = self.write_lock.lock().await;
		Self::write_atomic(&path, &value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);
		let _guard = self.write_lock.lock().await;
		Self::remove_file(&path).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
	) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		let _guard = self.write_lock.lock().await;

		let current = Self::read_optional(&path).await?;
		if current.as_deref() != expected {
			return Ok(false);
		}

		match new {
			Some(value) => Self::write_atomic(&path, &value).await?,
			None => Self::remove_file(&path).await?,
		}
		Ok(true)
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let (namespace, id_prefix) = prefix.split_once(':').unwrap_or((prefix, ""));
		let dir = self.base_path.join(sanitize(namespace));

		let mut entries = match fs::read_dir(&dir).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(RECORD_EXTENSION)) {
				continue;
			}
			let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
				tracing::debug!("Skipping non-UTF-8 record file {:?}", path);
				continue;
			};
			if id.starts_with(id_prefix) {
				keys.push(format!("{}:{}", namespace, id));
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}
}

/// Configuration schema for FileStorage.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if path.trim().is_empty() => {
							Err("storage_path cannot be empty".to_string())
						},
						_ => Ok(()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

/// Factory function to create a file storage backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: Base directory for file storage (default: "./data/escrow")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/escrow");

	Ok(Box::new(FileStorage::open(storage_path)?))
}

/// Registry for the file storage implementation.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
