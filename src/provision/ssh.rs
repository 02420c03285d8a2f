//! SSH/SFTP implementation of [`RemoteProvisioner`].

// std
use std::{
	fs::{self, File},
	io,
	net::{TcpStream, ToSocketAddrs},
	time::Duration,
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use ssh2::{ErrorCode, FileStat, HashType, Session, Sftp};
// self
use crate::{
	_prelude::*,
	provision::{ProvisionError, ProvisionTarget, RemoteLogin, RemoteProvisioner, ScratchDir},
};

/// `SSH_FX_NO_SUCH_FILE`.
const SFTP_NO_SUCH_FILE: i32 = 2;
const UNKNOWN_FINGERPRINT: &str = "<unavailable>";

/// How the server's host key is checked before any credential is sent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostKeyPolicy {
	/// Require the OpenSSH-style `SHA256:<base64>` fingerprint to match.
	Pinned(String),
	/// Accept whatever key the server presents. Logged as a warning on every connection.
	AcceptAny,
}

/// Fetches the provisioning directory over SFTP with password authentication.
#[derive(Clone, Debug)]
pub struct SshProvisioner {
	timeout: Duration,
}
impl SshProvisioner {
	/// Default connect and per-operation timeout.
	pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

	/// Overrides the connect and per-operation timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = timeout;

		self
	}

	fn connect(&self, target: &ProvisionTarget) -> Result<Session, ProvisionError> {
		let connect_err =
			|source| ProvisionError::Connect { host: target.host.clone(), port: target.port, source };
		let transport_err =
			|source| ProvisionError::Transport { host: target.host.clone(), source };
		let addrs = (target.host.as_str(), target.port).to_socket_addrs().map_err(connect_err)?;
		let mut last_err = io::Error::new(io::ErrorKind::NotFound, "host resolved to no addresses");
		let mut stream = None;

		for addr in addrs {
			match TcpStream::connect_timeout(&addr, self.timeout) {
				Ok(tcp) => {
					stream = Some(tcp);

					break;
				},
				Err(e) => last_err = e,
			}
		}

		let tcp = stream.ok_or_else(|| connect_err(last_err))?;
		let mut session = Session::new().map_err(transport_err)?;

		session.set_tcp_stream(tcp);
		session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
		session.handshake().map_err(transport_err)?;

		Ok(session)
	}
}
impl Default for SshProvisioner {
	fn default() -> Self {
		Self { timeout: Self::DEFAULT_TIMEOUT }
	}
}
impl RemoteProvisioner for SshProvisioner {
	fn fetch_bundle(
		&self,
		target: &ProvisionTarget,
		login: &RemoteLogin,
	) -> Result<ScratchDir, ProvisionError> {
		let session = self.connect(target)?;

		verify_host_key(host_key_fingerprint(&session), target)?;
		session.userauth_password(&login.username, login.password.expose()).map_err(|_| {
			ProvisionError::Authentication {
				host: target.host.clone(),
				username: login.username.clone(),
			}
		})?;

		if !session.authenticated() {
			return Err(ProvisionError::Authentication {
				host: target.host.clone(),
				username: login.username.clone(),
			});
		}

		let sftp = session
			.sftp()
			.map_err(|source| ProvisionError::Transport { host: target.host.clone(), source })?;
		let remote = Path::new(&target.remote_path);

		check_remote_root(sftp.stat(remote), &target.remote_path)?;

		let scratch = ScratchDir::create()?;

		download_dir(&sftp, remote, scratch.path())?;

		tracing::info!(host = %target.host, remote_path = %target.remote_path, "Fetched provisioning bundle.");

		Ok(scratch)
	}
}

/// OpenSSH-style `SHA256:<base64>` fingerprint of the key the server presented.
pub fn host_key_fingerprint(session: &Session) -> Option<String> {
	session.host_key_hash(HashType::Sha256).map(|hash| format!("SHA256:{}", STANDARD_NO_PAD.encode(hash)))
}

fn verify_host_key(presented: Option<String>, target: &ProvisionTarget) -> Result<(), ProvisionError> {
	let presented = presented.filter(|fingerprint| !fingerprint.is_empty());

	match (&target.host_key_policy, presented) {
		(HostKeyPolicy::Pinned(expected), Some(presented)) => {
			let expected = expected.trim();

			if !expected.is_empty() && expected == presented {
				Ok(())
			} else {
				Err(ProvisionError::HostKeyRejected { host: target.host.clone(), presented })
			}
		},
		(HostKeyPolicy::Pinned(_), None) => Err(ProvisionError::HostKeyRejected {
			host: target.host.clone(),
			presented: UNKNOWN_FINGERPRINT.into(),
		}),
		(HostKeyPolicy::AcceptAny, presented) => {
			tracing::warn!(
				host = %target.host,
				fingerprint = presented.as_deref().unwrap_or(UNKNOWN_FINGERPRINT),
				"Accepting unverified SSH host key; pin this fingerprint to prevent interception."
			);

			Ok(())
		},
	}
}

fn check_remote_root(stat: Result<FileStat, ssh2::Error>, path: &str) -> Result<(), ProvisionError> {
	match stat {
		Ok(stat) if stat.is_dir() => Ok(()),
		Ok(_) => Err(ProvisionError::MissingRemotePath { path: path.to_owned() }),
		Err(e) if matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE)) =>
			Err(ProvisionError::MissingRemotePath { path: path.to_owned() }),
		Err(e) => Err(ProvisionError::Transfer { path: path.to_owned(), source: e.into() }),
	}
}

fn download_dir(sftp: &Sftp, remote: &Path, local: &Path) -> Result<(), ProvisionError> {
	let transfer_err = |path: &Path| {
		let path = path.display().to_string();

		move |source: ssh2::Error| ProvisionError::Transfer { path, source: source.into() }
	};

	for (entry, stat) in sftp.readdir(remote).map_err(transfer_err(remote))? {
		let Some(name) = entry.file_name() else { continue };
		let destination = local.join(name);

		if stat.is_dir() {
			fs::create_dir(&destination)
				.map_err(|source| ProvisionError::Scratch { path: destination.clone(), source })?;
			download_dir(sftp, &entry, &destination)?;
		} else if stat.is_file() {
			let mut remote_file = sftp.open(&entry).map_err(transfer_err(&entry))?;
			let mut local_file = File::create(&destination)
				.map_err(|source| ProvisionError::Scratch { path: destination.clone(), source })?;

			io::copy(&mut remote_file, &mut local_file).map_err(|source| ProvisionError::Transfer {
				path: entry.display().to_string(),
				source,
			})?;
		}
	}

	Ok(())
}
