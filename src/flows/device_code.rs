//! RFC 8628 device authorization grant.

// std
use std::time::{Duration, Instant};
// crates.io
use oauth2::{
	DeviceAuthorizationResponse, DeviceCodeErrorResponse, DeviceCodeErrorResponseType,
	ExtraDeviceAuthorizationFields, HttpResponse, TokenResponse, basic::BasicTokenResponse,
};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TokenSecret},
	config::{Section, keys},
	error::AuthError,
	flows::{TokenAuthority, TokenState, common},
	http::{ResponseMetadata, TokenHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	prompt::DeviceCodeNotice,
	provider::DeviceRequest,
};

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const SLOW_DOWN_STEP: Duration = Duration::from_secs(5);
/// Upper bound on the provider-reported `expires_in`.
const MAX_CODE_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Extra fields of the device authorization response.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct DeviceMessageFields {
	/// Human-readable instructions (Microsoft identity platform).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}
impl ExtraDeviceAuthorizationFields for DeviceMessageFields {}

type DeviceDetails = DeviceAuthorizationResponse<DeviceMessageFields>;

#[derive(Debug)]
enum PollStep {
	Token(TokenSecret),
	Pending,
	SlowDown,
}

impl<C> TokenAuthority<C>
where
	C: ?Sized + TokenHttpClient,
{
	/// Runs the interactive device-code exchange and holds the issued token.
	///
	/// A missing client identifier is resolved first. The token is written to
	/// `api.access_token` when `persist` is set. On failure the previous state is restored and
	/// nothing is written.
	pub fn acquire_token(&mut self, persist: bool) -> Result<TokenSecret> {
		const KIND: FlowKind = FlowKind::DeviceCode;

		let _guard = FlowSpan::new(KIND, "acquire_token").entered();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let previous = self.state;

		self.state = TokenState::Exchanging;

		let result = self.exchange_device_code();
		let token = match obs::finish_flow(KIND, result) {
			Ok(token) => token,
			Err(e) => {
				self.state = previous;

				return Err(e);
			},
		};

		self.token = Some(token.clone());
		self.state = TokenState::Valid;

		if persist {
			self.config.write(Section::Api, keys::ACCESS_TOKEN, Some(token.expose()))?;

			tracing::info!(path = %self.config.path().display(), "Persisted new access token.");
		}

		Ok(token)
	}

	fn exchange_device_code(&self) -> Result<TokenSecret> {
		let identity = self.config.identity()?;
		let client_id = match identity.client_id {
			Some(client_id) => client_id,
			None => {
				tracing::info!("Client identifier is not provisioned; resolving it.");

				self.resolver.get_client_identifier(true)?
			},
		};
		let details = self.request_device_code(&client_id, &identity.scopes)?;
		let notice = DeviceCodeNotice {
			verification_uri: details.verification_uri().as_str().to_owned(),
			user_code: details.user_code().secret().to_owned(),
			message: details.extra_fields().message.clone(),
			expires_in: details.expires_in(),
		};

		self.prompter.device_code(&notice);

		self.poll_for_token(&client_id, &details)
	}

	fn request_device_code(&self, client_id: &ClientId, scopes: &ScopeSet) -> Result<DeviceDetails> {
		let mut form = BTreeMap::from([("client_id".to_owned(), client_id.to_string())]);

		if let Some(scope) = common::format_scope(scopes, self.descriptor.quirks.scope_delimiter) {
			form.insert("scope".into(), scope);
		}

		self.strategy.augment_device_request(DeviceRequest::Authorization, &mut form);

		let (response, meta) = common::post_form(
			&*self.http_client,
			&self.descriptor.endpoints.device_authorization,
			&form,
		)?;

		if !response.status().is_success() {
			return Err(endpoint_error("device_authorization", &response, meta).into());
		}

		Ok(common::parse_json("device_authorization", &response)?)
	}

	fn poll_for_token(&self, client_id: &ClientId, details: &DeviceDetails) -> Result<TokenSecret> {
		let lifetime = details.expires_in().min(MAX_CODE_LIFETIME);
		let budget = match self.exchange.timeout {
			Some(timeout) => timeout.min(lifetime),
			None => lifetime,
		};
		// Bounded by `MAX_CODE_LIFETIME`, so the addition cannot overflow.
		let deadline = Instant::now() + budget;
		let mut interval = details.interval();
		let mut form = BTreeMap::from([
			("grant_type".to_owned(), DEVICE_CODE_GRANT.to_owned()),
			("client_id".to_owned(), client_id.to_string()),
			("device_code".to_owned(), details.device_code().secret().to_owned()),
		]);

		self.strategy.augment_device_request(DeviceRequest::Token, &mut form);

		loop {
			common::wait(interval, deadline, &self.exchange.cancel)?;

			let (response, meta) =
				common::post_form(&*self.http_client, &self.descriptor.endpoints.token, &form)?;

			match classify_poll_response(&response, meta)? {
				PollStep::Token(token) => return Ok(token),
				PollStep::Pending => tracing::debug!("Device authorization pending."),
				PollStep::SlowDown => {
					interval = interval.saturating_add(SLOW_DOWN_STEP);

					tracing::debug!(interval_secs = interval.as_secs(), "Provider asked to slow down.");
				},
			}
		}
	}
}

fn classify_poll_response(
	response: &HttpResponse,
	meta: Option<ResponseMetadata>,
) -> Result<PollStep, AuthError> {
	if response.status().is_success() {
		let token: BasicTokenResponse = common::parse_json("token", response)?;

		return Ok(PollStep::Token(TokenSecret::new(token.access_token().secret().to_owned())));
	}

	let Ok(error) = serde_json::from_slice::<DeviceCodeErrorResponse>(response.body()) else {
		return Err(endpoint_error("token", response, meta));
	};
	let description = error.error_description().cloned();

	match error.error() {
		DeviceCodeErrorResponseType::AuthorizationPending => Ok(PollStep::Pending),
		DeviceCodeErrorResponseType::SlowDown => Ok(PollStep::SlowDown),
		DeviceCodeErrorResponseType::ExpiredToken => Err(AuthError::ExchangeTimeout),
		DeviceCodeErrorResponseType::AccessDenied => Err(AuthError::ExchangeDenied {
			reason: description.unwrap_or_else(|| "access_denied".into()),
		}),
		other if error_code(other) == "authorization_declined" => Err(AuthError::ExchangeDenied {
			reason: description.unwrap_or_else(|| "authorization_declined".into()),
		}),
		other => Err(AuthError::Endpoint {
			endpoint: "token",
			status: Some(response.status().as_u16()),
			code: Some(error_code(other).to_owned()),
			message: description.unwrap_or_else(|| "unexpected error response".into()),
			retry_after: meta.and_then(|meta| meta.retry_after),
		}),
	}
}

fn error_code(error: &DeviceCodeErrorResponseType) -> &str {
	AsRef::<str>::as_ref(error)
}

fn endpoint_error(
	endpoint: &'static str,
	response: &HttpResponse,
	meta: Option<ResponseMetadata>,
) -> AuthError {
	let parsed = serde_json::from_slice::<DeviceCodeErrorResponse>(response.body()).ok();
	let code = parsed.as_ref().map(|error| error_code(error.error()).to_owned());
	let message = parsed
		.as_ref()
		.and_then(|error| error.error_description().cloned())
		.unwrap_or_else(|| {
			let preview = common::body_preview(response);

			if preview.trim().is_empty() { "empty response body".into() } else { preview }
		});

	AuthError::Endpoint {
		endpoint,
		status: Some(response.status().as_u16()),
		code,
		message,
		retry_after: meta.and_then(|meta| meta.retry_after),
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;

	fn response(status: u16, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = StatusCode::from_u16(status).expect("Test status should be valid.");

		response
	}

	#[test]
	fn pending_and_slow_down_keep_polling() {
		assert!(matches!(
			classify_poll_response(&response(400, r#"{"error":"authorization_pending"}"#), None),
			Ok(PollStep::Pending)
		));
		assert!(matches!(
			classify_poll_response(&response(400, r#"{"error":"slow_down"}"#), None),
			Ok(PollStep::SlowDown)
		));
	}

	#[test]
	fn terminal_poll_errors_are_mapped() {
		assert!(matches!(
			classify_poll_response(&response(400, r#"{"error":"expired_token"}"#), None),
			Err(AuthError::ExchangeTimeout)
		));

		let denied = classify_poll_response(
			&response(400, r#"{"error":"authorization_declined","error_description":"User said no."}"#),
			None,
		);

		assert!(matches!(denied, Err(AuthError::ExchangeDenied { reason }) if reason == "User said no."));

		let other = classify_poll_response(
			&response(400, r#"{"error":"bad_verification_code"}"#),
			Some(ResponseMetadata { status: Some(400), retry_after: None }),
		);

		assert!(matches!(
			other,
			Err(AuthError::Endpoint { endpoint: "token", status: Some(400), code: Some(code), .. })
				if code == "bad_verification_code"
		));
	}

	#[test]
	fn success_yields_access_token() {
		let step = classify_poll_response(
			&response(200, r#"{"access_token":"issued-token","token_type":"Bearer","expires_in":3599}"#),
			None,
		)
		.expect("Successful poll should yield a token.");

		assert!(matches!(step, PollStep::Token(token) if token.expose() == "issued-token"));
	}

	#[test]
	fn non_json_error_becomes_endpoint_error() {
		let err = classify_poll_response(&response(503, "<html>down</html>"), None)
			.expect_err("Non-JSON error must fail.");

		assert!(matches!(
			err,
			AuthError::Endpoint { status: Some(503), code: None, message, .. } if message.contains("down")
		));
	}

	#[test]
	fn device_authorization_message_is_optional() {
		let with_message: DeviceDetails = serde_json::from_str(
			r#"{"device_code":"dc","user_code":"ABCD","verification_uri":"https://microsoft.com/devicelogin","expires_in":900,"interval":5,"message":"Enter ABCD."}"#,
		)
		.expect("Response with message should parse.");
		let without: DeviceDetails = serde_json::from_str(
			r#"{"device_code":"dc","user_code":"ABCD","verification_uri":"https://example.com/device","expires_in":900}"#,
		)
		.expect("Response without message should parse.");

		assert_eq!(with_message.extra_fields().message.as_deref(), Some("Enter ABCD."));
		assert!(without.extra_fields().message.is_none());
		assert_eq!(without.interval(), Duration::from_secs(5));
	}
}
