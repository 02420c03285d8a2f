//! Client identifier resolution from the remotely provisioned, encrypted bundle.
//!
//! Stages run strictly in order: prompt, fetch bundle, decrypt, extract fields, optionally
//! persist. The scratch directory holding the private key is removed before the result is
//! returned, whatever the outcome.

// std
use std::{fmt, fs, io};
// crates.io
use rsa::traits::PublicKeyParts;
// self
use crate::{
	_prelude::*,
	auth::{ClientId, IdentifierError, TokenSecret},
	config::{ConfigStore, Section, keys},
	crypto::{self, Cipher, EncryptedBundle, KeyPair},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	prompt::Prompter,
	provision::{ProvisionTarget, RemoteProvisioner, ScratchDir},
};

/// Failures specific to turning a fetched bundle into credentials.
#[derive(Debug, ThisError)]
pub enum ResolveError {
	/// The user could not be prompted for the remote login.
	#[error("Remote login prompt failed.")]
	Prompt(#[source] io::Error),
	/// A required artifact is absent from the fetched directory.
	#[error("Provisioning bundle is missing {name}.")]
	MissingArtifact {
		/// Artifact file name.
		name: &'static str,
	},
	/// The decrypted payload is not `client_id:secret`.
	#[error("Decrypted credentials are malformed: {reason}.")]
	MalformedPlaintext {
		/// What was wrong with the payload.
		reason: &'static str,
	},
	/// The decrypted client identifier failed validation.
	#[error(transparent)]
	InvalidClientId(#[from] IdentifierError),
}

/// Resolution stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResolveStage {
	/// Prompting for the remote login.
	Prompt,
	/// Copying the bundle into the scratch directory.
	FetchBundle,
	/// Loading the private key and opening the bundle.
	Decrypt,
	/// Splitting the plaintext into identifier and secret.
	ExtractFields,
	/// Writing the identifier to the config file.
	Persist,
}
impl ResolveStage {
	/// Returns a stable label suitable for span or log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Prompt => "prompt",
			Self::FetchBundle => "fetch_bundle",
			Self::Decrypt => "decrypt",
			Self::ExtractFields => "extract_fields",
			Self::Persist => "persist",
		}
	}
}
impl Display for ResolveStage {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Decrypted `client_id:secret` pair. Only the identifier is ever persisted.
#[derive(Clone, Debug)]
pub struct ClientCredentials {
	/// Registered application identifier.
	pub client_id: ClientId,
	/// Application secret; carried but unused by the device-code exchange.
	pub secret: TokenSecret,
}

/// Source of the application's client identifier.
pub trait ClientIdResolver: Send + Sync {
	/// Produces the client identifier, writing it to the config file when `persistent`.
	fn get_client_identifier(&self, persistent: bool) -> Result<ClientId>;
}

/// Resolves credentials by fetching and decrypting the remote bundle.
pub struct CredentialResolver {
	config: Arc<ConfigStore>,
	provisioner: Arc<dyn RemoteProvisioner>,
	cipher: Arc<dyn Cipher>,
	prompter: Arc<dyn Prompter>,
	target: ProvisionTarget,
}
impl CredentialResolver {
	/// Creates a resolver for the provided remote target.
	pub fn new(
		config: Arc<ConfigStore>,
		provisioner: Arc<dyn RemoteProvisioner>,
		cipher: Arc<dyn Cipher>,
		prompter: Arc<dyn Prompter>,
		target: ProvisionTarget,
	) -> Self {
		Self { config, provisioner, cipher, prompter, target }
	}

	/// Remote target this resolver fetches from.
	pub fn target(&self) -> &ProvisionTarget {
		&self.target
	}

	/// Runs every stage and returns the decrypted credentials.
	///
	/// Each call fetches a fresh bundle; nothing is cached.
	pub fn resolve(&self, persistent: bool) -> Result<ClientCredentials> {
		const KIND: FlowKind = FlowKind::Resolve;

		let _guard = FlowSpan::new(KIND, "resolve").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		obs::finish_flow(KIND, self.resolve_inner(persistent))
	}

	fn resolve_inner(&self, persistent: bool) -> Result<ClientCredentials> {
		let login = self
			.prompter
			.remote_login(&self.target)
			.map_err(ResolveError::Prompt)
			.inspect_err(|e| stage_failed(ResolveStage::Prompt, e))?;

		tracing::info!(
			stage = %ResolveStage::FetchBundle,
			host = %self.target.host,
			"Fetching encrypted credential bundle."
		);

		let scratch = self
			.provisioner
			.fetch_bundle(&self.target, &login)
			.inspect_err(|e| stage_failed(ResolveStage::FetchBundle, e))?;

		drop(login);

		let opened = self.open_bundle(&scratch);
		let cleanup = scratch.cleanup();

		if let Err(e) = &cleanup {
			tracing::error!(error = %e, "Failed to remove scratch directory.");
		}

		let credentials = opened?;

		cleanup?;

		if persistent {
			self.config
				.write(Section::Identity, keys::CLIENT_ID, Some(credentials.client_id.as_ref()))
				.inspect_err(|e| stage_failed(ResolveStage::Persist, e))?;

			tracing::warn!(
				path = %self.config.path().display(),
				"Client identifier written to the configuration file. Do not commit or share this \
				 file."
			);
		}

		Ok(credentials)
	}

	fn open_bundle(&self, scratch: &ScratchDir) -> Result<ClientCredentials> {
		let key_path = locate_artifact(scratch.path(), KeyPair::PRIVATE_PEM)?;
		let bundle_path = locate_artifact(scratch.path(), EncryptedBundle::FILE_NAME)?;
		let plaintext = {
			let private_key = crypto::read_private_key_pem(&key_path)
				.inspect_err(|e| stage_failed(ResolveStage::Decrypt, e))?;
			let key_size = private_key.size();
			let bundle = EncryptedBundle::read(&bundle_path, key_size)
				.inspect_err(|e| stage_failed(ResolveStage::Decrypt, e))?;

			self.cipher
				.decrypt(&bundle, &private_key)
				.inspect_err(|e| stage_failed(ResolveStage::Decrypt, e))?
		};

		tracing::debug!(stage = %ResolveStage::ExtractFields, "Bundle decrypted.");

		split_credentials(&plaintext)
			.inspect_err(|e| stage_failed(ResolveStage::ExtractFields, e))
			.map_err(Error::from)
	}
}
impl ClientIdResolver for CredentialResolver {
	fn get_client_identifier(&self, persistent: bool) -> Result<ClientId> {
		self.resolve(persistent).map(|credentials| credentials.client_id)
	}
}
impl Debug for CredentialResolver {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialResolver")
			.field("config", &self.config.path())
			.field("target", &self.target)
			.finish_non_exhaustive()
	}
}

/// Splits `client_id:secret` at the first `:`. The secret may be empty; the separator may not.
pub fn split_credentials(plaintext: &[u8]) -> Result<ClientCredentials, ResolveError> {
	let text = std::str::from_utf8(plaintext)
		.map_err(|_| ResolveError::MalformedPlaintext { reason: "payload is not valid UTF-8" })?;
	let (client_id, secret) = text
		.split_once(':')
		.ok_or(ResolveError::MalformedPlaintext { reason: "missing `:` separator" })?;

	Ok(ClientCredentials { client_id: ClientId::new(client_id)?, secret: TokenSecret::new(secret) })
}

fn locate_artifact(root: &Path, name: &'static str) -> Result<PathBuf, ResolveError> {
	let direct = root.join(name);

	if direct.is_file() {
		return Ok(direct);
	}

	// One level of nesting covers a copied `.keys/` directory.
	fs::read_dir(root)
		.into_iter()
		.flatten()
		.flatten()
		.map(|entry| entry.path().join(name))
		.find(|candidate| candidate.is_file())
		.ok_or(ResolveError::MissingArtifact { name })
}

fn stage_failed(stage: ResolveStage, error: &dyn fmt::Display) {
	tracing::error!(stage = %stage, error = %error, "Credential resolution failed.");
}
