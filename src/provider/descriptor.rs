//! Identity-provider descriptor data structures shared by all flows.

/// Builder API for assembling descriptors.
pub mod builder;
/// Provider-specific quirk toggles.
pub mod quirks;

pub use builder::*;
pub use quirks::*;

// self
use crate::{_prelude::*, auth::TenantId, config::ApiSettings};

/// Authority host of the Microsoft identity platform.
pub const MICROSOFT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Endpoint set declared by an identity descriptor.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityEndpoints {
	/// RFC 8628 device authorization endpoint.
	pub device_authorization: Url,
	/// Token endpoint polled during the device-code exchange.
	pub token: Url,
	/// Protected-API endpoint used to check whether a token is still accepted.
	pub probe: Url,
}

/// Immutable identity descriptor consumed by flows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
	/// Endpoint definitions.
	pub endpoints: IdentityEndpoints,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl IdentityDescriptor {
	/// Creates a new builder.
	pub fn builder() -> IdentityDescriptorBuilder {
		IdentityDescriptorBuilder::default()
	}

	/// Microsoft identity platform endpoints for `tenant`, probing `https://{hostname}/{version}/me`.
	pub fn microsoft(tenant: &TenantId, api: &ApiSettings) -> Result<Self, DescriptorError> {
		let authority = format!("{MICROSOFT_AUTHORITY}/{tenant}/oauth2/v2.0");

		Self::builder()
			.device_authorization_endpoint(parse_endpoint(
				"device_authorization",
				&format!("{authority}/devicecode"),
			)?)
			.token_endpoint(parse_endpoint("token", &format!("{authority}/token"))?)
			.probe_endpoint(parse_endpoint(
				"probe",
				&format!("https://{}/{}/me", api.hostname, api.version),
			)?)
			.build()
	}
}

fn parse_endpoint(endpoint: &'static str, raw: &str) -> Result<Url, DescriptorError> {
	Url::parse(raw).map_err(|e| DescriptorError::InvalidEndpoint { endpoint, reason: e.to_string() })
}
