//! Owner-only temporary directory holding decrypted-key material for the duration of one
//! resolution.

// crates.io
use tempfile::{Builder, TempDir};
// self
use crate::{_prelude::*, provision::ProvisionError};

const PREFIX: &str = "credential-bootstrap-";

/// RAII scratch directory. Removed by [`cleanup`](Self::cleanup) or, failing that, on drop.
#[derive(Debug)]
pub struct ScratchDir {
	dir: TempDir,
}
impl ScratchDir {
	/// Creates a fresh directory (mode `0700` on Unix) under the system temp location.
	pub fn create() -> Result<Self, ProvisionError> {
		Builder::new()
			.prefix(PREFIX)
			.tempdir()
			.map(|dir| Self { dir })
			.map_err(|source| ProvisionError::Scratch { path: std::env::temp_dir(), source })
	}

	/// Directory root.
	pub fn path(&self) -> &Path {
		self.dir.path()
	}

	/// Removes the directory and everything in it, reporting failures.
	pub fn cleanup(self) -> Result<(), ProvisionError> {
		let path = self.dir.path().to_path_buf();

		self.dir.close().map_err(|source| ProvisionError::Scratch { path, source })?;

		tracing::debug!("Removed scratch directory.");

		Ok(())
	}
}
