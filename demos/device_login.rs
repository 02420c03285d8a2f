//! Bootstraps an access token against the Microsoft identity platform.
//!
//! Reads the config file given as the first argument. When `identity.client_id` is unset, the
//! encrypted bundle is fetched from `PROVISION_HOST:PROVISION_PATH` over SSH; set
//! `PROVISION_HOST_KEY` to the server's `SHA256:` fingerprint to pin it.
//!
//! ```text
//! RUST_LOG=credential_bootstrap=debug cargo run --example device_login -- config.toml
//! ```

// std
use std::{env, sync::Arc, time::Duration};
// crates.io
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::EnvFilter;
// self
use credential_bootstrap::{
	config::ConfigStore,
	crypto::HybridCipher,
	flows::{ExchangeOptions, ReqwestTokenAuthority},
	prompt::TerminalPrompter,
	provider::IdentityDescriptor,
	provision::{HostKeyPolicy, ProvisionTarget, SshProvisioner},
	resolver::CredentialResolver,
};

fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let path = env::args().nth(1).ok_or_else(|| eyre!("usage: device_login <config.toml>"))?;
	let config = Arc::new(ConfigStore::open(path)?);
	let identity = config.identity()?;
	let descriptor = IdentityDescriptor::microsoft(&identity.tenant_id, &config.api()?)?;
	let host_key_policy = match env::var("PROVISION_HOST_KEY") {
		Ok(fingerprint) => HostKeyPolicy::Pinned(fingerprint),
		Err(_) => HostKeyPolicy::AcceptAny,
	};
	let target = ProvisionTarget::new(
		env::var("PROVISION_HOST").unwrap_or_else(|_| "localhost".into()),
		env::var("PROVISION_PATH").unwrap_or_else(|_| ".keys".into()),
		host_key_policy,
	);
	let prompter = Arc::new(TerminalPrompter);
	let resolver = Arc::new(CredentialResolver::new(
		config.clone(),
		Arc::new(SshProvisioner::default()),
		Arc::new(HybridCipher::default()),
		prompter.clone(),
		target,
	));
	let mut authority = ReqwestTokenAuthority::new(config, resolver, prompter, descriptor)?
		.with_exchange_options(ExchangeOptions::default().with_timeout(Duration::from_secs(600)));
	let session = authority.bootstrap()?;

	println!("Authenticated against {} (token source: {}).", session.base_url(), authority.state());

	Ok(())
}
