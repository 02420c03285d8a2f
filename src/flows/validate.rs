//! Token validation against the protected API.

// crates.io
use oauth2::{
	HttpResponse,
	http::{
		Method,
		header::{ACCEPT, AUTHORIZATION},
	},
};
use serde_json::Value;
// self
use crate::{
	_prelude::*,
	error::{AuthError, ConfigError},
	flows::{TokenAuthority, TokenState, common},
	http::{ResponseMetadata, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	provider::{ProbeErrorContext, ProbeErrorKind},
};

/// Result of [`TokenAuthority::authenticate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProbeOutcome {
	/// The protected API accepted the token.
	Valid,
	/// The token was rejected as invalid and a new one was obtained and persisted.
	Refreshed(ProbeRejection),
	/// The probe failed for a reason unrelated to token validity; the token was kept.
	Rejected(ProbeRejection),
}

/// Details of a failed probe.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProbeRejection {
	/// Classification chosen by the provider strategy.
	pub kind: ProbeErrorKind,
	/// HTTP status code.
	pub status: u16,
	/// Provider error code, when the body carried one.
	pub code: Option<String>,
	/// Provider error message, when the body carried one.
	pub message: Option<String>,
	/// Retry-After hint, when supplied.
	pub retry_after: Option<time::Duration>,
}

impl<C> TokenAuthority<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Probes the protected API with the held token.
	///
	/// An invalid or expired token starts a device-code exchange and persists its result. Any
	/// other rejection is logged as a warning and reported as [`ProbeOutcome::Rejected`].
	/// Transport failures propagate as [`AuthError::Transport`].
	pub fn authenticate(&mut self) -> Result<ProbeOutcome> {
		const KIND: FlowKind = FlowKind::Validate;

		let _guard = FlowSpan::new(KIND, "authenticate").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = self.authenticate_inner();

		obs::finish_flow(KIND, result)
	}

	fn authenticate_inner(&mut self) -> Result<ProbeOutcome> {
		let token = self.token.clone().ok_or(AuthError::NotAuthenticated)?;
		let previous = self.state;

		self.state = TokenState::Validating;

		let request = oauth2::http::Request::builder()
			.method(Method::GET)
			.uri(self.descriptor.endpoints.probe.as_str())
			.header(AUTHORIZATION, format!("Bearer {}", token.expose()))
			.header(ACCEPT, "application/json")
			.body(Vec::new())
			.map_err(ConfigError::from)?;
		let (response, meta) = match common::send(&*self.http_client, request) {
			Ok(sent) => sent,
			Err(e) => {
				self.state = previous;

				return Err(e);
			},
		};

		if response.status().is_success() {
			tracing::debug!("Access token accepted by the protected API.");

			self.state = TokenState::Valid;

			return Ok(ProbeOutcome::Valid);
		}

		let rejection = self.classify(&response, meta);

		match rejection.kind {
			ProbeErrorKind::InvalidToken => {
				tracing::warn!(
					status = rejection.status,
					code = rejection.code.as_deref().unwrap_or_default(),
					"Access token is invalid or expired; starting a device-code exchange."
				);

				self.state = TokenState::Expired;
				self.acquire_token(true)?;

				Ok(ProbeOutcome::Refreshed(rejection))
			},
			ProbeErrorKind::Transient | ProbeErrorKind::Other => {
				tracing::warn!(
					status = rejection.status,
					code = rejection.code.as_deref().unwrap_or_default(),
					message = rejection.message.as_deref().unwrap_or_default(),
					transient = rejection.kind == ProbeErrorKind::Transient,
					"Protected API rejected the probe for a reason other than token validity."
				);

				self.state = previous;

				Ok(ProbeOutcome::Rejected(rejection))
			},
		}
	}

	fn classify(&self, response: &HttpResponse, meta: Option<ResponseMetadata>) -> ProbeRejection {
		let status = response.status().as_u16();
		let (code, message) = parse_error_body(response.body());
		let mut ctx = ProbeErrorContext::default().with_http_status(status);

		if let Some(code) = &code {
			ctx = ctx.with_error_code(code.clone());
		}
		if let Some(message) = &message {
			ctx = ctx.with_error_message(message.clone());
		}
		if code.is_none() && !response.body().is_empty() {
			ctx = ctx.with_body_preview(common::body_preview(response));
		}

		ProbeRejection {
			kind: self.strategy.classify_probe_error(&ctx),
			status,
			code,
			message,
			retry_after: meta.and_then(|meta| meta.retry_after),
		}
	}
}

/// Extracts `(code, message)` from Graph-style (`{"error":{"code","message"}}`) or OAuth-style
/// (`{"error","error_description"}`) bodies. Anything else yields nothing.
fn parse_error_body(body: &[u8]) -> (Option<String>, Option<String>) {
	let Ok(value) = serde_json::from_slice::<Value>(body) else {
		return (None, None);
	};
	let text = |v: Option<&Value>| v.and_then(Value::as_str).map(ToOwned::to_owned);

	match value.get("error") {
		Some(Value::Object(error)) => (text(error.get("code")), text(error.get("message"))),
		Some(Value::String(code)) => (Some(code.clone()), text(value.get("error_description"))),
		_ => (None, None),
	}
}
