//! Assembly of an escrow configuration split across several files.
//!
//! The main file may move whole sections into other files with
//! `include = ["storage.toml", "payment.toml"]`. Every file may only hold
//! escrow sections, each section lives in exactly one file, and included
//! files cannot include further files. Paths are relative to the directory
//! of the main file.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Top-level sections an escrow configuration is made of.
const SECTIONS: [&str; 5] = ["engine", "storage", "payment", "dispute", "api"];

const INCLUDE_KEY: &str = "include";

/// Reads the main escrow config file and merges the sections of its includes.
pub struct ConfigLoader {
	base_dir: PathBuf,
	/// Canonical path of every file read so far.
	read: Vec<PathBuf>,
	/// File each section was taken from.
	owners: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_dir: impl AsRef<Path>) -> Self {
		Self {
			base_dir: base_dir.as_ref().to_path_buf(),
			read: Vec::new(),
			owners: HashMap::new(),
		}
	}

	/// Loads `main` and its includes into one validated [`Config`].
	pub async fn load_config(&mut self, main: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let main_path = self.locate(main.as_ref())?;
		let mut sections = self.read_sections(&main_path).await?;

		let includes = match sections.remove(INCLUDE_KEY) {
			Some(value) => include_list(value, &main_path)?,
			None => Vec::new(),
		};
		self.claim(&sections, &main_path)?;

		for include in includes {
			let path = self.locate(&include)?;
			let mut included = self.read_sections(&path).await?;
			if included.remove(INCLUDE_KEY).is_some() {
				return Err(ConfigError::Validation(format!(
					"{} is included by {} and cannot include further escrow config files",
					path.display(),
					main_path.display()
				)));
			}
			self.claim(&included, &path)?;
			sections.extend(included);
		}

		let assembled = toml::to_string(&sections).map_err(|e| {
			ConfigError::Parse(format!(
				"cannot assemble escrow config from {}: {}",
				main_path.display(),
				e
			))
		})?;
		assembled.parse()
	}

	/// Reads one file, substitutes environment variables and returns its
	/// top-level table.
	async fn read_sections(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = path.canonicalize()?;
		if self.read.contains(&canonical) {
			return Err(ConfigError::Validation(format!(
				"escrow config file {} is included more than once",
				path.display()
			)));
		}
		self.read.push(canonical);

		let content = tokio::fs::read_to_string(path).await?;
		let content = resolve_env_vars(&content)?;
		let table: toml::Table = toml::from_str(&content).map_err(|e| {
			ConfigError::Parse(format!("{}: {}", path.display(), e.message()))
		})?;
		Ok(table)
	}

	/// Records `file` as the owner of each of its sections.
	fn claim(&mut self, sections: &toml::Table, file: &Path) -> Result<(), ConfigError> {
		for name in sections.keys() {
			if !SECTIONS.contains(&name.as_str()) {
				return Err(ConfigError::Validation(format!(
					"{} defines unknown section [{}]; escrow config sections are {}",
					file.display(),
					name,
					SECTIONS.join(", ")
				)));
			}
			if let Some(owner) = self.owners.get(name) {
				return Err(ConfigError::Validation(format!(
					"section [{}] is defined in both {} and {}",
					name,
					owner.display(),
					file.display()
				)));
			}
			self.owners.insert(name.clone(), file.to_path_buf());
		}
		Ok(())
	}

	fn locate(&self, path: &Path) -> Result<PathBuf, ConfigError> {
		let full = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_dir.join(path)
		};
		if !full.is_file() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("escrow config file not found: {}", full.display()),
			)));
		}
		Ok(full)
	}
}

/// Reads the `include` value of the main file: one path or a list of paths.
fn include_list(value: toml::Value, main: &Path) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || {
		ConfigError::Validation(format!(
			"{}: include must be a file name or a list of file names",
			main.display()
		))
	};
	match value {
		toml::Value::String(path) => Ok(vec![PathBuf::from(path)]),
		toml::Value::Array(paths) => paths
			.into_iter()
			.map(|path| match path {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(invalid()),
			})
			.collect(),
		_ => Err(invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const ENGINE: &str = "[engine]\nid = \"escrow-split\"\n";
	const STORAGE: &str = "[storage]\nprimary = \"memory\"\n[storage.implementations.memory]\n";
	const PAYMENT: &str = "[payment]\nprimary = \"mock\"\n[payment.implementations.mock]\n";

	fn write(dir: &TempDir, name: &str, contents: &str) {
		fs::write(dir.path().join(name), contents).unwrap();
	}

	async fn load(dir: &TempDir) -> Result<Config, ConfigError> {
		ConfigLoader::new(dir.path()).load_config("main.toml").await
	}

	#[tokio::test]
	async fn test_single_file() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("{ENGINE}{STORAGE}{PAYMENT}"));

		let config = load(&dir).await.unwrap();
		assert_eq!(config.engine.id, "escrow-split");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_sections_from_included_files() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"storage.toml\", \"payment.toml\"]\n{ENGINE}"),
		);
		write(
			&dir,
			"storage.toml",
			"[storage]\nprimary = \"file\"\n[storage.implementations.file]\nstorage_path = \"./data/escrow\"\n",
		);
		write(
			&dir,
			"payment.toml",
			&format!("{PAYMENT}[payment.reference_formats]\nmobile_money = \"^[0-9]{{10}}$\"\n"),
		);

		let config = load(&dir).await.unwrap();
		assert_eq!(config.engine.id, "escrow-split");
		assert_eq!(config.storage.primary, "file");
		assert_eq!(
			config.payment.reference_formats.get("mobile_money").map(String::as_str),
			Some("^[0-9]{10}$")
		);
	}

	#[tokio::test]
	async fn test_single_include_path() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = \"rest.toml\"\n{ENGINE}"));
		write(&dir, "rest.toml", &format!("{STORAGE}{PAYMENT}"));

		let config = load(&dir).await.unwrap();
		assert_eq!(config.payment.primary, "mock");
	}

	#[tokio::test]
	async fn test_section_in_two_files_rejected() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"storage.toml\"]\n{ENGINE}{STORAGE}{PAYMENT}"),
		);
		write(&dir, "storage.toml", STORAGE);

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("section [storage] is defined in both"), "{err}");
		assert!(err.contains("storage.toml"), "{err}");
	}

	#[tokio::test]
	async fn test_unknown_section_in_include_rejected() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"extra.toml\"]\n{ENGINE}{STORAGE}{PAYMENT}"),
		);
		write(&dir, "extra.toml", "[settlement]\ndelay = 5\n");

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("unknown section [settlement]"), "{err}");
		assert!(err.contains("extra.toml"), "{err}");
	}

	#[tokio::test]
	async fn test_unknown_section_in_main_rejected() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("{ENGINE}{STORAGE}{PAYMENT}[solver]\nid = \"x\"\n"));

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("unknown section [solver]"), "{err}");
	}

	#[tokio::test]
	async fn test_nested_include_rejected() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [\"storage.toml\"]\n{ENGINE}{PAYMENT}"));
		write(&dir, "storage.toml", &format!("include = [\"more.toml\"]\n{STORAGE}"));
		write(&dir, "more.toml", "[dispute]\nresolvers = []\n");

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("cannot include further"), "{err}");
	}

	#[tokio::test]
	async fn test_self_include_rejected() {
		let dir = TempDir::new().unwrap();
		write(
			&dir,
			"main.toml",
			&format!("include = [\"main.toml\"]\n{ENGINE}{STORAGE}{PAYMENT}"),
		);

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("included more than once"), "{err}");
	}

	#[tokio::test]
	async fn test_malformed_include_rejected() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [1]\n{ENGINE}{STORAGE}{PAYMENT}"));

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("include must be a file name"), "{err}");
	}

	#[tokio::test]
	async fn test_missing_include_reported() {
		let dir = TempDir::new().unwrap();
		write(&dir, "main.toml", &format!("include = [\"absent.toml\"]\n{ENGINE}"));

		let err = load(&dir).await.unwrap_err().to_string();
		assert!(err.contains("escrow config file not found"), "{err}");
	}
}
