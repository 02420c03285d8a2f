//! Provider strategy hooks that customize device-code requests and probe classification.
//!
//! Implementations decorate outgoing form requests and normalize error mapping without tying
//! flows to any particular HTTP client.

// self
use crate::_prelude::*;

/// Endpoint a device-code form request targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceRequest {
	/// Initial request for the user/device code pair.
	Authorization,
	/// Token poll.
	Token,
}

/// Strategy hook that allows providers to decorate requests and classify errors.
///
/// Override only what you need; [`augment_device_request`](Self::augment_device_request) has a
/// default no-op implementation.
pub trait ProviderStrategy: Send + Sync {
	/// Classifies a non-success probe response.
	fn classify_probe_error(&self, ctx: &ProbeErrorContext) -> ProbeErrorKind;

	/// Gives providers a chance to add custom form parameters before dispatching.
	fn augment_device_request(&self, _request: DeviceRequest, _form: &mut BTreeMap<String, String>) {}
}

/// Canonical probe failure categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProbeErrorKind {
	/// The token is invalid or expired; a new exchange is required.
	InvalidToken,
	/// The service is throttling or unavailable; the token may still be valid.
	Transient,
	/// Any other rejection (permissions, bad request); the token is kept.
	Other,
}

/// Context passed to provider strategies when classifying probe errors.
///
/// Only primitive data (status code, error fields, body preview) is kept so strategies stay
/// decoupled from the HTTP client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeErrorContext {
	/// HTTP status code returned by the API, when available.
	pub http_status: Option<u16>,
	/// Provider error code (`error.code` or OAuth `error`).
	pub error_code: Option<String>,
	/// Provider error message (`error.message` or OAuth `error_description`).
	pub error_message: Option<String>,
	/// Preview of the response body for non-JSON payloads.
	pub body_preview: Option<String>,
}
impl ProbeErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Adds an HTTP status code.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Adds the provider error code.
	pub fn with_error_code(mut self, code: impl Into<String>) -> Self {
		self.error_code = Some(code.into());

		self
	}

	/// Adds the provider error message.
	pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
		self.error_message = Some(message.into());

		self
	}

	/// Adds a body preview for non-JSON payloads.
	pub fn with_body_preview(mut self, body: impl Into<String>) -> Self {
		self.body_preview = Some(truncate_preview(body.into()));

		self
	}
}

/// Default strategy covering Microsoft Graph and RFC 6750 error shapes.
///
/// Structured codes win over the status code; a bare `401` is treated as an invalid token.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl Display for DefaultProviderStrategy {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("default-provider-strategy")
	}
}
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_probe_error(&self, ctx: &ProbeErrorContext) -> ProbeErrorKind {
		if let Some(kind) = ctx.error_code.as_deref().and_then(match_code) {
			return kind;
		}

		classify_status(ctx.http_status)
	}
}

fn truncate_preview(body: String) -> String {
	if body.chars().count() <= ProbeErrorContext::BODY_PREVIEW_LIMIT {
		return body;
	}

	let mut buf: String = body.chars().take(ProbeErrorContext::BODY_PREVIEW_LIMIT).collect();

	buf.push('…');

	buf
}

fn match_code(code: &str) -> Option<ProbeErrorKind> {
	const INVALID: [&str; 3] = ["InvalidAuthenticationToken", "invalid_token", "TokenExpired"];
	const TRANSIENT: [&str; 5] = [
		"serviceNotAvailable",
		"activityLimitReached",
		"TooManyRequests",
		"temporarily_unavailable",
		"server_error",
	];

	if INVALID.iter().any(|c| c.eq_ignore_ascii_case(code)) {
		Some(ProbeErrorKind::InvalidToken)
	} else if TRANSIENT.iter().any(|c| c.eq_ignore_ascii_case(code)) {
		Some(ProbeErrorKind::Transient)
	} else {
		None
	}
}

fn classify_status(status: Option<u16>) -> ProbeErrorKind {
	match status {
		Some(401) => ProbeErrorKind::InvalidToken,
		Some(429) => ProbeErrorKind::Transient,
		Some(code) if code >= 500 => ProbeErrorKind::Transient,
		_ => ProbeErrorKind::Other,
	}
}
