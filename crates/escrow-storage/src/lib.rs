//! Storage module for the P2P escrow system.
//!
//! This module provides abstractions for persistent storage of escrow data,
//! supporting different backend implementations such as in-memory or
//! file-based storage. Every backend offers an atomic compare-and-swap, which
//! is the only primitive the engine uses to serialize competing writers.

use async_trait::async_trait;
use escrow_types::{ConfigSchema, ImplementationRegistry};
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// A conditional write found a different value than expected.
	#[error("Conflict: {0} was modified concurrently")]
	Conflict(String),
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

impl StorageError {
	/// Backend and serialization failures cannot be fixed by retrying the
	/// same request.
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			StorageError::Backend(_)
				| StorageError::Serialization(_)
				| StorageError::Configuration(_)
		)
	}
}

/// Trait defining the low-level interface for storage backends.
///
/// This trait must be implemented by any storage backend that wants to
/// integrate with the escrow system. It provides basic key-value operations
/// plus an atomic compare-and-swap.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, overwriting any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Atomically replaces the value of `key` if it currently equals
	/// `expected`.
	///
	/// `expected = None` means the key must be absent. `new = None` deletes
	/// the key. Returns `false` without writing when the current value does
	/// not match.
	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
	) -> Result<bool, StorageError>;

	/// Lists all keys starting with `prefix`.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Type alias for storage factory functions.
///
/// This is the function signature that all storage implementations must provide
/// to create instances of their storage interface.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
///
/// This trait extends the base ImplementationRegistry to specify that
/// storage implementations must provide a StorageFactory.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Get all registered storage implementations.
///
/// Returns a vector of (name, factory) tuples for all available storage implementations.
/// This is used by the factory registry to automatically register all implementations.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Opaque token identifying the stored state a value was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision(Vec<u8>);

/// A value together with the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
	pub value: T,
	pub revision: Revision,
}

/// High-level storage service that provides typed operations.
///
/// The StorageService wraps a low-level storage backend and provides
/// convenient methods for storing and retrieving typed data with
/// automatic serialization/deserialization.
pub struct StorageService {
	/// The underlying storage backend implementation.
	backend: Box<dyn StorageInterface>,
}

fn storage_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

fn encode<T: Serialize>(data: &T) -> Result<Vec<u8>, StorageError> {
	serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, StorageError> {
	serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value, overwriting any previous value.
	///
	/// The namespace and id are combined to form a unique key.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		self.backend.set_bytes(&key, encode(data)?).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let key = storage_key(namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;
		decode(&bytes)
	}

	/// Retrieves a value along with the revision it was read at.
	pub async fn retrieve_versioned<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<Versioned<T>, StorageError> {
		let key = storage_key(namespace, id);
		let bytes = self.backend.get_bytes(&key).await?;
		Ok(Versioned {
			value: decode(&bytes)?,
			revision: Revision(bytes),
		})
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		self.backend.delete(&key).await
	}

	/// Updates an existing value in storage.
	///
	/// Returns an error if the key doesn't exist, making it semantically different
	/// from store() which will create or overwrite.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);

		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		self.backend.set_bytes(&key, encode(data)?).await
	}

	/// Writes `data` only if the stored value is still at `revision`.
	///
	/// Returns the new revision, or `StorageError::Conflict` if another writer
	/// got there first.
	pub async fn update_if_unchanged<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		revision: &Revision,
		data: &T,
	) -> Result<Revision, StorageError> {
		let key = storage_key(namespace, id);
		let bytes = encode(data)?;
		if self
			.backend
			.compare_and_swap(&key, Some(&revision.0), Some(bytes.clone()))
			.await?
		{
			Ok(Revision(bytes))
		} else {
			Err(StorageError::Conflict(key))
		}
	}

	/// Stores `data` only if nothing is stored under the key yet.
	pub async fn insert_if_absent<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<Revision, StorageError> {
		let key = storage_key(namespace, id);
		let bytes = encode(data)?;
		if self
			.backend
			.compare_and_swap(&key, None, Some(bytes.clone()))
			.await?
		{
			Ok(Revision(bytes))
		} else {
			Err(StorageError::Conflict(key))
		}
	}

	/// Deletes the value only if it is still at `revision`.
	pub async fn remove_if_unchanged(
		&self,
		namespace: &str,
		id: &str,
		revision: &Revision,
	) -> Result<(), StorageError> {
		let key = storage_key(namespace, id);
		if self
			.backend
			.compare_and_swap(&key, Some(&revision.0), None)
			.await?
		{
			Ok(())
		} else {
			Err(StorageError::Conflict(key))
		}
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		let key = storage_key(namespace, id);
		self.backend.exists(&key).await
	}

	/// Retrieves every value stored in a namespace, in key order.
	///
	/// Entries deleted between listing and reading are skipped.
	pub async fn list<T: DeserializeOwned>(&self, namespace: &str) -> Result<Vec<T>, StorageError> {
		let mut keys = self.backend.list_keys(&storage_key(namespace, "")).await?;
		keys.sort();

		let mut values = Vec::with_capacity(keys.len());
		for key in keys {
			match self.backend.get_bytes(&key).await {
				Ok(bytes) => values.push(decode(&bytes)?),
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			}
		}
		Ok(values)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;
	use std::sync::Arc;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Record {
		id: String,
		version: u32,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	fn record(version: u32) -> Record {
		Record {
			id: "r-1".into(),
			version,
		}
	}

	#[tokio::test]
	async fn test_update_requires_existing_key() {
		let storage = service();
		let result = storage.update("records", "r-1", &record(1)).await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		storage.store("records", "r-1", &record(1)).await.unwrap();
		storage.update("records", "r-1", &record(2)).await.unwrap();
		let stored: Record = storage.retrieve("records", "r-1").await.unwrap();
		assert_eq!(stored.version, 2);
	}

	#[tokio::test]
	async fn test_stale_revision_conflicts() {
		let storage = service();
		storage.store("records", "r-1", &record(1)).await.unwrap();

		let first: Versioned<Record> = storage.retrieve_versioned("records", "r-1").await.unwrap();
		let second: Versioned<Record> = storage.retrieve_versioned("records", "r-1").await.unwrap();

		storage
			.update_if_unchanged("records", "r-1", &first.revision, &record(2))
			.await
			.unwrap();
		let result = storage
			.update_if_unchanged("records", "r-1", &second.revision, &record(3))
			.await;
		assert!(matches!(result, Err(StorageError::Conflict(_))));

		let stored: Record = storage.retrieve("records", "r-1").await.unwrap();
		assert_eq!(stored.version, 2);
	}

	#[tokio::test]
	async fn test_insert_if_absent_only_once() {
		let storage = service();
		storage
			.insert_if_absent("records", "r-1", &record(1))
			.await
			.unwrap();
		let result = storage.insert_if_absent("records", "r-1", &record(2)).await;
		assert!(matches!(result, Err(StorageError::Conflict(_))));
	}

	#[tokio::test]
	async fn test_remove_if_unchanged() {
		let storage = service();
		let revision = storage
			.insert_if_absent("records", "r-1", &record(1))
			.await
			.unwrap();
		storage
			.update("records", "r-1", &record(2))
			.await
			.unwrap();

		let result = storage.remove_if_unchanged("records", "r-1", &revision).await;
		assert!(matches!(result, Err(StorageError::Conflict(_))));

		let current: Versioned<Record> = storage.retrieve_versioned("records", "r-1").await.unwrap();
		storage
			.remove_if_unchanged("records", "r-1", &current.revision)
			.await
			.unwrap();
		assert!(!storage.exists("records", "r-1").await.unwrap());
	}

	#[tokio::test]
	async fn test_list_is_scoped_to_namespace() {
		let storage = service();
		for id in ["b", "a", "c"] {
			let value = Record {
				id: id.into(),
				version: 1,
			};
			storage.store("records", id, &value).await.unwrap();
		}
		storage.store("others", "a", &record(9)).await.unwrap();

		let records: Vec<Record> = storage.list("records").await.unwrap();
		let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
		assert_eq!(ids, vec!["a", "b", "c"]);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_writers_single_winner() {
		let storage = Arc::new(service());
		storage.store("records", "r-1", &record(0)).await.unwrap();
		let base: Versioned<Record> = storage.retrieve_versioned("records", "r-1").await.unwrap();

		let mut handles = Vec::new();
		for version in 1..=8 {
			let storage = Arc::clone(&storage);
			let revision = base.revision.clone();
			handles.push(tokio::spawn(async move {
				storage
					.update_if_unchanged("records", "r-1", &revision, &record(version))
					.await
			}));
		}

		let mut winners = 0;
		for handle in handles {
			match handle.await.unwrap() {
				Ok(_) => winners += 1,
				Err(StorageError::Conflict(_)) => {},
				Err(e) => panic!("unexpected error: {}", e),
			}
		}
		assert_eq!(winners, 1);
	}
}
