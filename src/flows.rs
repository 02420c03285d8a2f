//! Token lifecycle orchestration: source selection, validation probes, and device-code exchange.

pub mod common;

mod device_code;
mod validate;

pub use common::*;
pub use device_code::DeviceMessageFields;
pub use validate::*;

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	config::{ConfigStore, Section, UNSET_SENTINEL, keys},
	error::AuthError,
	http::TokenHttpClient,
	prompt::Prompter,
	provider::{DefaultProviderStrategy, IdentityDescriptor, ProviderStrategy},
	resolver::ClientIdResolver,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

/// Environment variable whose value overrides the persisted access token.
pub const DEFAULT_TOKEN_ENV: &str = "APP_TOKEN";

#[cfg(feature = "reqwest")]
/// Token authority specialized for the crate's default reqwest transport.
pub type ReqwestTokenAuthority = TokenAuthority<ReqwestHttpClient>;

/// Where the held token came from and what has been established about it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenState {
	/// No token is held.
	Unset,
	/// Token supplied by the environment; trusted without probing.
	FromEnv,
	/// Token loaded from the config file; not yet probed.
	FromConfig,
	/// A probe is in flight.
	Validating,
	/// The protected API accepted the token, or it was just issued.
	Valid,
	/// The protected API reported the token as invalid or expired.
	Expired,
	/// A device-code exchange is in flight.
	Exchanging,
}
impl TokenState {
	/// Returns a stable label suitable for log fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Unset => "unset",
			Self::FromEnv => "from_env",
			Self::FromConfig => "from_config",
			Self::Validating => "validating",
			Self::Valid => "valid",
			Self::Expired => "expired",
			Self::Exchanging => "exchanging",
		}
	}
}
impl Display for TokenState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Everything a caller needs to talk to the protected API.
#[derive(Clone, Debug)]
pub struct ApiSession {
	/// API host, e.g. `graph.microsoft.com`.
	pub hostname: String,
	/// API version path segment.
	pub version: String,
	/// Bearer token.
	pub bearer: TokenSecret,
}
impl ApiSession {
	/// `https://{hostname}/{version}`.
	pub fn base_url(&self) -> String {
		format!("https://{}/{}", self.hostname, self.version)
	}

	/// Value for the `Authorization` header.
	pub fn authorization_header(&self) -> String {
		format!("Bearer {}", self.bearer.expose())
	}
}

/// Holds the current access token and drives its validation and renewal.
///
/// The authority owns the HTTP client, config store, identity descriptor, and strategy
/// references so the validate and device-code flows only deal with protocol logic. Calls take
/// `&mut self`; share an authority across threads behind a mutex.
pub struct TokenAuthority<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// HTTP client wrapper used for every outbound request.
	pub http_client: Arc<C>,
	/// Config store holding identity settings and the persisted token.
	pub config: Arc<ConfigStore>,
	/// Source of the client identifier when the config has none.
	pub resolver: Arc<dyn ClientIdResolver>,
	/// Shows the device-code instructions.
	pub prompter: Arc<dyn Prompter>,
	/// Identity endpoints and quirks.
	pub descriptor: IdentityDescriptor,
	/// Probe classification and request decoration hooks.
	pub strategy: Arc<dyn ProviderStrategy>,
	/// Timeout and cancellation for the device-code exchange.
	pub exchange: ExchangeOptions,
	token_env: String,
	state: TokenState,
	token: Option<TokenSecret>,
}
impl<C> TokenAuthority<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Creates an authority around a caller-provided transport and loads the token source.
	///
	/// The [`DEFAULT_TOKEN_ENV`] variable wins over `api.access_token`.
	pub fn with_http_client(
		config: Arc<ConfigStore>,
		resolver: Arc<dyn ClientIdResolver>,
		prompter: Arc<dyn Prompter>,
		descriptor: IdentityDescriptor,
		http_client: impl Into<Arc<C>>,
	) -> Result<Self> {
		let mut authority = Self {
			http_client: http_client.into(),
			config,
			resolver,
			prompter,
			descriptor,
			strategy: Arc::new(DefaultProviderStrategy),
			exchange: ExchangeOptions::default(),
			token_env: DEFAULT_TOKEN_ENV.into(),
			state: TokenState::Unset,
			token: None,
		};

		authority.load_token_source()?;

		Ok(authority)
	}

	/// Replaces the provider strategy.
	pub fn with_strategy(mut self, strategy: Arc<dyn ProviderStrategy>) -> Self {
		self.strategy = strategy;

		self
	}

	/// Replaces the device-code exchange options.
	pub fn with_exchange_options(mut self, options: ExchangeOptions) -> Self {
		self.exchange = options;

		self
	}

	/// Reads the override token from `name` instead of [`DEFAULT_TOKEN_ENV`], reloading the source.
	pub fn with_token_env(mut self, name: impl Into<String>) -> Result<Self> {
		self.token_env = name.into();
		self.load_token_source()?;

		Ok(self)
	}

	/// Current lifecycle state.
	pub fn state(&self) -> TokenState {
		self.state
	}

	/// Token currently held, if any.
	pub fn token(&self) -> Option<&TokenSecret> {
		self.token.as_ref()
	}

	/// Brings the authority to a usable token and returns the API session.
	///
	/// Environment tokens are trusted as is. Config tokens are probed first. Missing or expired
	/// tokens start a device-code exchange whose result is persisted.
	pub fn bootstrap(&mut self) -> Result<ApiSession> {
		match self.state {
			TokenState::Unset | TokenState::Expired => {
				self.acquire_token(true)?;
			},
			TokenState::FromConfig | TokenState::Validating | TokenState::Exchanging => {
				self.authenticate()?;
			},
			TokenState::FromEnv | TokenState::Valid => {},
		}

		self.session()
	}

	/// Session built from the held token and the `api` section.
	pub fn session(&self) -> Result<ApiSession> {
		let bearer = self.token.clone().ok_or(AuthError::NotAuthenticated)?;
		let api = self.config.api()?;

		Ok(ApiSession { hostname: api.hostname, version: api.version, bearer })
	}

	fn load_token_source(&mut self) -> Result<()> {
		let from_env = std::env::var(&self.token_env)
			.ok()
			.filter(|value| !value.is_empty() && value != UNSET_SENTINEL);

		if let Some(value) = from_env {
			tracing::debug!(env = %self.token_env, "Using access token from the environment.");

			self.token = Some(TokenSecret::new(value));
			self.state = TokenState::FromEnv;

			return Ok(());
		}

		match self.config.read(Section::Api, keys::ACCESS_TOKEN)? {
			Some(value) => {
				self.token = Some(TokenSecret::new(value));
				self.state = TokenState::FromConfig;
			},
			None => {
				self.token = None;
				self.state = TokenState::Unset;
			},
		}

		tracing::debug!(state = %self.state, "Loaded access token source.");

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl TokenAuthority<ReqwestHttpClient> {
	/// Creates an authority backed by a default [`ReqwestHttpClient`].
	pub fn new(
		config: Arc<ConfigStore>,
		resolver: Arc<dyn ClientIdResolver>,
		prompter: Arc<dyn Prompter>,
		descriptor: IdentityDescriptor,
	) -> Result<Self> {
		Self::with_http_client(config, resolver, prompter, descriptor, ReqwestHttpClient::new()?)
	}
}
impl<C> Debug for TokenAuthority<C>
where
	C: ?Sized + TokenHttpClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenAuthority")
			.field("config", &self.config.path())
			.field("descriptor", &self.descriptor)
			.field("exchange", &self.exchange)
			.field("token_env", &self.token_env)
			.field("state", &self.state)
			.field("token", &self.token)
			.finish_non_exhaustive()
	}
}
