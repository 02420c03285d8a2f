//! Seals a `client_id:secret` pair into a bundle directory ready to upload to the provisioning host.
//!
//! ```text
//! cargo run --example seal_bundle -- <output-dir> <client-id> <secret>
//! ```

// std
use std::{env, path::PathBuf};
// crates.io
use color_eyre::{Result, eyre::eyre};
use tracing_subscriber::EnvFilter;
// self
use credential_bootstrap::crypto::{self, EncryptedBundle, HybridCipher, KeyPair};

fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let mut args = env::args().skip(1);
	let (Some(dir), Some(client_id), Some(secret)) = (args.next(), args.next(), args.next()) else {
		return Err(eyre!("usage: seal_bundle <output-dir> <client-id> <secret>"));
	};
	let dir = PathBuf::from(dir);
	let pair = crypto::seal_credentials(&HybridCipher::default(), &dir, &client_id, &secret)?;

	println!("Sealed bundle in {}.", dir.display());
	println!("  {}", dir.join(KeyPair::PRIVATE_PEM).display());
	println!("  {}", dir.join(KeyPair::PUBLIC_PEM).display());
	println!("  {}", dir.join(EncryptedBundle::FILE_NAME).display());
	println!("Key fingerprint: {}.", pair.fingerprint()?);

	Ok(())
}
