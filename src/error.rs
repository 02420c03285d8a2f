//! Crate-level error types shared across the cipher, provisioner, resolver, and token flows.

// std
use std::io;
// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, ScopeValidationError},
	config::Section,
	crypto::CryptoError,
	provider::DescriptorError,
	provision::ProvisionError,
	resolver::ResolveError,
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Configuration file or value problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Key generation, wrap/unwrap, or authentication-tag failure.
	#[error(transparent)]
	Crypto(#[from] CryptoError),
	/// Remote bundle retrieval failure.
	#[error(transparent)]
	Provision(#[from] ProvisionError),
	/// Bundle contents could not be turned into client credentials.
	#[error(transparent)]
	Resolve(#[from] ResolveError),
	/// Token validation or exchange failure.
	#[error(transparent)]
	Auth(#[from] AuthError),
}
impl From<DescriptorError> for Error {
	fn from(e: DescriptorError) -> Self {
		Self::Config(e.into())
	}
}

/// Configuration failures. A missing identity is never replaced by a fabricated default.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// The config file does not exist.
	#[error("Configuration file {} does not exist.", path.display())]
	Missing {
		/// Expected config location.
		path: PathBuf,
	},
	/// The config file already exists and will not be overwritten.
	#[error("Configuration file {} already exists.", path.display())]
	AlreadyExists {
		/// Existing config location.
		path: PathBuf,
	},
	/// The config file could not be read.
	#[error("Failed to read configuration file {}.", path.display())]
	Read {
		/// Config location.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: io::Error,
	},
	/// The config file could not be written.
	#[error("Failed to write configuration file {}.", path.display())]
	Write {
		/// Config location.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: io::Error,
	},
	/// The config file is not valid TOML.
	#[error("Configuration file {} is corrupt.", path.display())]
	Corrupt {
		/// Config location.
		path: PathBuf,
		/// Parser failure.
		#[source]
		source: toml::de::Error,
	},
	/// The in-memory record could not be serialized.
	#[error("Configuration could not be serialized.")]
	Serialize(#[from] toml::ser::Error),
	/// A required section/key pair is absent.
	#[error("Configuration is missing `{section}.{key}`.")]
	MissingKey {
		/// Section the key belongs to.
		section: Section,
		/// Key name.
		key: String,
	},
	/// A required value still holds the unset sentinel.
	#[error("Configuration value `{section}.{key}` has not been provisioned.")]
	Unset {
		/// Section the key belongs to.
		section: Section,
		/// Key name.
		key: String,
	},
	/// A value exists but has the wrong shape.
	#[error("Configuration value `{section}.{key}` is invalid: {reason}.")]
	InvalidValue {
		/// Section the key belongs to.
		section: Section,
		/// Key name.
		key: String,
		/// Why the value was rejected.
		reason: String,
	},
	/// An identifier value failed validation.
	#[error(transparent)]
	InvalidIdentifier(#[from] IdentifierError),
	/// The scope list failed validation.
	#[error(transparent)]
	InvalidScope(#[from] ScopeValidationError),
	/// Identity-provider endpoints are invalid.
	#[error(transparent)]
	InvalidDescriptor(#[from] DescriptorError),
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token validation and exchange failures.
///
/// Variants split into two families so callers can tell the user what to do next:
/// [`requires_reauthentication`](Self::requires_reauthentication) covers "token invalid,
/// re-authenticate", [`is_retryable_later`](Self::is_retryable_later) covers "network/server
/// error, try later".
#[derive(Debug, ThisError)]
pub enum AuthError {
	/// The identity provider reported the token as invalid or expired.
	#[error("Access token is invalid or expired ({code}): {message}. Re-authenticate to continue.")]
	InvalidToken {
		/// Provider error code.
		code: String,
		/// Provider error message.
		message: String,
	},
	/// The user did not finish the device-code authorization in time.
	#[error("Device-code authorization timed out. Re-authenticate to continue.")]
	ExchangeTimeout,
	/// The user or the provider declined the device-code authorization.
	#[error("Device-code authorization was denied: {reason}.")]
	ExchangeDenied {
		/// Provider-supplied reason.
		reason: String,
	},
	/// The caller cancelled the device-code exchange.
	#[error("Device-code authorization was cancelled.")]
	ExchangeCancelled,
	/// No access token is held yet.
	#[error("No access token is available. Authenticate first.")]
	NotAuthenticated,
	/// The identity provider answered with a non-token error.
	#[error("The {endpoint} endpoint returned an error{}: {message}. Try again later.", status.map(|s| format!(" ({s})")).unwrap_or_default())]
	Endpoint {
		/// Endpoint label.
		endpoint: &'static str,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Provider error code, when available.
		code: Option<String>,
		/// Provider- or crate-supplied message.
		message: String,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<time::Duration>,
	},
	/// The identity provider responded with JSON that could not be parsed.
	#[error("The {endpoint} endpoint returned malformed JSON. Try again later.")]
	ResponseParse {
		/// Endpoint label.
		endpoint: &'static str,
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Network failure while talking to the identity provider.
	#[error(transparent)]
	Transport(#[from] TransportError),
}
impl AuthError {
	/// Stable reason label for logs and user-facing messages.
	pub const fn reason(&self) -> &'static str {
		match self {
			Self::InvalidToken { .. } => "invalid-token",
			Self::ExchangeTimeout => "exchange-timeout",
			Self::ExchangeDenied { .. } => "exchange-denied",
			Self::ExchangeCancelled => "exchange-cancelled",
			Self::NotAuthenticated => "not-authenticated",
			Self::Endpoint { .. } => "endpoint-error",
			Self::ResponseParse { .. } => "response-parse",
			Self::Transport(_) => "transport",
		}
	}

	/// Returns true when the user has to authenticate again.
	pub const fn requires_reauthentication(&self) -> bool {
		matches!(
			self,
			Self::InvalidToken { .. }
				| Self::ExchangeTimeout
				| Self::ExchangeDenied { .. }
				| Self::ExchangeCancelled
				| Self::NotAuthenticated
		)
	}

	/// Returns true when the failure came from the network or the server side.
	pub const fn is_retryable_later(&self) -> bool {
		matches!(self, Self::Endpoint { .. } | Self::ResponseParse { .. } | Self::Transport(_))
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the identity provider.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the identity provider.")]
	Io(#[from] io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
