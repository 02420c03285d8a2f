//! Shared helpers for flow implementations (scope formatting, request dispatch, poll waits).

// std
use std::{
	sync::atomic::{AtomicBool, Ordering},
	thread,
	time::{Duration, Instant},
};
// crates.io
use oauth2::{
	HttpRequest, HttpResponse, SyncHttpClient,
	http::{
		Method,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::ScopeSet,
	error::{AuthError, ConfigError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

const POLL_SLICE: Duration = Duration::from_millis(100);
const BODY_PREVIEW_LIMIT: usize = 256;

/// Cooperative cancellation flag shared between the caller and a running exchange.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);
impl CancellationToken {
	/// Creates a token in the non-cancelled state.
	pub fn new() -> Self {
		Self::default()
	}

	/// Requests cancellation. Observed within one poll slice.
	pub fn cancel(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	/// Returns true once [`cancel`](Self::cancel) has been called on any clone.
	pub fn is_cancelled(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Bounds applied to the interactive device-code exchange.
#[derive(Clone, Debug, Default)]
pub struct ExchangeOptions {
	/// Upper bound on the whole exchange; the provider's code lifetime applies when shorter.
	pub timeout: Option<Duration>,
	/// Cancellation flag checked between polls.
	pub cancel: CancellationToken,
}
impl ExchangeOptions {
	/// Sets the exchange timeout.
	pub fn with_timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Shares a cancellation token with the caller.
	pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
		self.cancel = cancel;

		self
	}
}

/// Joins normalized scopes with the provider's delimiter when building requests.
pub(crate) fn format_scope(scope: &ScopeSet, delimiter: char) -> Option<String> {
	if scope.is_empty() {
		return None;
	}

	Some(scope.join(delimiter))
}

/// Dispatches a request through a fresh metadata-recording handle.
pub(crate) fn send<C>(
	client: &C,
	request: HttpRequest,
) -> Result<(HttpResponse, Option<ResponseMetadata>)>
where
	C: ?Sized + TokenHttpClient,
{
	let slot = ResponseMetadataSlot::default();
	let handle = client.with_metadata(slot.clone());
	let response = handle.call(request).map_err(TransportError::network).map_err(AuthError::from)?;

	Ok((response, slot.take()))
}

/// POSTs an `application/x-www-form-urlencoded` body.
pub(crate) fn post_form<C>(
	client: &C,
	url: &Url,
	form: &BTreeMap<String, String>,
) -> Result<(HttpResponse, Option<ResponseMetadata>)>
where
	C: ?Sized + TokenHttpClient,
{
	let body = url::form_urlencoded::Serializer::new(String::new()).extend_pairs(form.iter()).finish();
	let request = oauth2::http::Request::builder()
		.method(Method::POST)
		.uri(url.as_str())
		.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
		.header(ACCEPT, "application/json")
		.body(body.into_bytes())
		.map_err(ConfigError::from)?;

	send(client, request)
}

/// Deserializes a JSON body, keeping the failing path for diagnostics.
pub(crate) fn parse_json<T>(endpoint: &'static str, response: &HttpResponse) -> Result<T, AuthError>
where
	T: DeserializeOwned,
{
	let mut deserializer = serde_json::Deserializer::from_slice(response.body());

	serde_path_to_error::deserialize(&mut deserializer).map_err(|source| AuthError::ResponseParse {
		endpoint,
		source,
		status: Some(response.status().as_u16()),
	})
}

/// Truncated, lossy UTF-8 view of a response body.
pub(crate) fn body_preview(response: &HttpResponse) -> String {
	let text = String::from_utf8_lossy(response.body());

	text.chars().take(BODY_PREVIEW_LIMIT).collect()
}

/// Sleeps until `interval` has elapsed, in short slices so cancellation is observed promptly.
///
/// Fails with [`AuthError::ExchangeTimeout`] once `deadline` passes and with
/// [`AuthError::ExchangeCancelled`] when `cancel` fires.
pub(crate) fn wait(
	interval: Duration,
	deadline: Instant,
	cancel: &CancellationToken,
) -> Result<(), AuthError> {
	// An interval past the representable range can only end at the deadline.
	let wake = Instant::now().checked_add(interval).unwrap_or(deadline);

	loop {
		if cancel.is_cancelled() {
			return Err(AuthError::ExchangeCancelled);
		}

		let now = Instant::now();

		if now >= deadline {
			return Err(AuthError::ExchangeTimeout);
		}
		if now >= wake {
			return Ok(());
		}

		thread::sleep((wake.min(deadline) - now).min(POLL_SLICE));
	}
}
