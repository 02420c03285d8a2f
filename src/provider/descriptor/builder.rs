// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	provider::{IdentityDescriptor, IdentityEndpoints, ProviderQuirks},
};

/// Errors raised while constructing or validating descriptors.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum DescriptorError {
	/// Device authorization endpoint is required.
	#[error("Missing device authorization endpoint.")]
	MissingDeviceAuthorizationEndpoint,
	/// Token endpoint is required.
	#[error("Missing token endpoint.")]
	MissingTokenEndpoint,
	/// Probe endpoint is required.
	#[error("Missing probe endpoint.")]
	MissingProbeEndpoint,
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// An endpoint assembled from configuration is not a valid URL.
	#[error("The {endpoint} endpoint is not a valid URL: {reason}.")]
	InvalidEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Parser diagnostic.
		reason: String,
	},
	/// Reject scope delimiters that are control characters.
	#[error("Scope delimiter must be a printable character.")]
	InvalidScopeDelimiter {
		/// Invalid delimiter that was supplied.
		delimiter: char,
	},
}

/// Builder for [`IdentityDescriptor`] values.
#[derive(Debug, Default)]
pub struct IdentityDescriptorBuilder {
	/// Device authorization endpoint.
	pub device_authorization_endpoint: Option<Url>,
	/// Token endpoint.
	pub token_endpoint: Option<Url>,
	/// Probe endpoint on the protected API.
	pub probe_endpoint: Option<Url>,
	/// Provider-specific quirks.
	pub quirks: ProviderQuirks,
}
impl IdentityDescriptorBuilder {
	/// Sets the device authorization endpoint.
	pub fn device_authorization_endpoint(mut self, url: Url) -> Self {
		self.device_authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the probe endpoint.
	pub fn probe_endpoint(mut self, url: Url) -> Self {
		self.probe_endpoint = Some(url);

		self
	}

	/// Overrides the provider quirks.
	pub fn quirks(mut self, quirks: ProviderQuirks) -> Self {
		self.quirks = quirks;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<IdentityDescriptor, DescriptorError> {
		let device_authorization = self
			.device_authorization_endpoint
			.ok_or(DescriptorError::MissingDeviceAuthorizationEndpoint)?;
		let token = self.token_endpoint.ok_or(DescriptorError::MissingTokenEndpoint)?;
		let probe = self.probe_endpoint.ok_or(DescriptorError::MissingProbeEndpoint)?;
		let descriptor = IdentityDescriptor {
			endpoints: IdentityEndpoints { device_authorization, token, probe },
			quirks: self.quirks,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl IdentityDescriptor {
	fn validate(&self) -> Result<(), DescriptorError> {
		validate_endpoint("device_authorization", &self.endpoints.device_authorization)?;
		validate_endpoint("token", &self.endpoints.token)?;
		validate_endpoint("probe", &self.endpoints.probe)?;
		validate_scope_delimiter(self.quirks.scope_delimiter)?;

		Ok(())
	}
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), DescriptorError> {
	if url.scheme() == "https" || (url.scheme() == "http" && is_loopback(url)) {
		Ok(())
	} else {
		Err(DescriptorError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}

fn validate_scope_delimiter(delimiter: char) -> Result<(), DescriptorError> {
	if delimiter.is_control() {
		Err(DescriptorError::InvalidScopeDelimiter { delimiter })
	} else {
		Ok(())
	}
}
