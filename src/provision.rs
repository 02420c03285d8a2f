//! Remote retrieval of the encrypted credential bundle.
//!
//! A [`RemoteProvisioner`] copies the remote provisioning directory into a fresh
//! [`ScratchDir`]. The scratch directory is owned by the caller and removed when it is cleaned
//! up or dropped, on success and failure alike.

pub mod scratch;
pub mod ssh;

pub use scratch::*;
pub use ssh::*;

// std
use std::io;
// self
use crate::{_prelude::*, auth::TokenSecret};

/// Remote retrieval failures.
#[derive(Debug, ThisError)]
pub enum ProvisionError {
	/// TCP connection to the host failed.
	#[error("Could not connect to {host}:{port}.")]
	Connect {
		/// Remote host.
		host: String,
		/// Remote port.
		port: u16,
		/// Underlying socket failure.
		#[source]
		source: io::Error,
	},
	/// The SSH session could not be established.
	#[error("SSH session with {host} could not be established.")]
	Transport {
		/// Remote host.
		host: String,
		/// Underlying protocol failure.
		#[source]
		source: ssh2::Error,
	},
	/// The server presented a host key that does not match the pinned fingerprint.
	#[error("Host key for {host} does not match the pinned fingerprint (presented {presented}).")]
	HostKeyRejected {
		/// Remote host.
		host: String,
		/// Fingerprint the server presented.
		presented: String,
	},
	/// The username/password pair was rejected.
	#[error("SSH authentication failed for {username}@{host}.")]
	Authentication {
		/// Remote host.
		host: String,
		/// Rejected user name.
		username: String,
	},
	/// The remote provisioning directory does not exist.
	#[error("Remote path {path} does not exist or is not a directory.")]
	MissingRemotePath {
		/// Remote path.
		path: String,
	},
	/// A remote file could not be listed or copied.
	#[error("Failed to transfer {path}.")]
	Transfer {
		/// Remote path being transferred.
		path: String,
		/// Underlying failure.
		#[source]
		source: io::Error,
	},
	/// The local scratch directory could not be created, written, or removed.
	#[error("Scratch directory operation failed on {}.", path.display())]
	Scratch {
		/// Local path.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: io::Error,
	},
}

/// Remote location of the provisioning directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProvisionTarget {
	/// SSH host name.
	pub host: String,
	/// SSH port.
	pub port: u16,
	/// Absolute directory on the remote host holding the bundle artifacts.
	pub remote_path: String,
	/// How the server's host key is verified.
	pub host_key_policy: HostKeyPolicy,
}
impl ProvisionTarget {
	/// Default SSH port.
	pub const DEFAULT_PORT: u16 = 22;

	/// Creates a target on the default port. The host-key policy is always an explicit choice.
	pub fn new(
		host: impl Into<String>,
		remote_path: impl Into<String>,
		host_key_policy: HostKeyPolicy,
	) -> Self {
		Self {
			host: host.into(),
			port: Self::DEFAULT_PORT,
			remote_path: remote_path.into(),
			host_key_policy,
		}
	}

	/// Overrides the SSH port.
	pub fn with_port(mut self, port: u16) -> Self {
		self.port = port;

		self
	}
}

/// Interactive credentials for the remote host. The password is redacted and wiped on drop.
#[derive(Clone, Debug)]
pub struct RemoteLogin {
	/// Remote user name.
	pub username: String,
	/// Remote password.
	pub password: TokenSecret,
}

/// Copies the remote provisioning directory into a local scratch directory.
pub trait RemoteProvisioner: Send + Sync {
	/// Fetches every artifact under `target.remote_path`.
	///
	/// On error, any scratch directory created along the way has already been removed.
	fn fetch_bundle(
		&self,
		target: &ProvisionTarget,
		login: &RemoteLogin,
	) -> Result<ScratchDir, ProvisionError>;
}
