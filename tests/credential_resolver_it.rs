mod common;

// std
use std::sync::Arc;
// self
use common::*;
use credential_bootstrap::{
	config::{Section, keys},
	crypto::{CryptoError, HybridCipher},
	error::Error,
	resolver::{ClientIdResolver, CredentialResolver, ResolveError},
};

fn resolver_for(
	dir: &std::path::Path,
	provisioner: Arc<FakeProvisioner>,
	prompter: Arc<RecordingPrompter>,
) -> CredentialResolver {
	CredentialResolver::new(
		write_config(dir, None, None),
		provisioner,
		Arc::new(HybridCipher::default()),
		prompter,
		test_target(),
	)
}

#[test]
fn resolves_and_persists_client_identifier() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:secretabc", BundleLayout::Flat));
	let prompter = Arc::new(RecordingPrompter::default());
	let resolver = resolver_for(dir.path(), provisioner.clone(), prompter.clone());
	let credentials = resolver.resolve(true).expect("Resolution should succeed.");

	assert_eq!(credentials.client_id.as_ref(), "clientid123");
	assert_eq!(credentials.secret.expose(), "secretabc");
	assert_eq!(
		read_back(dir.path(), Section::Identity, keys::CLIENT_ID).as_deref(),
		Some("clientid123")
	);
	assert_eq!(prompter.logins.load(std::sync::atomic::Ordering::SeqCst), 1);

	let contents = std::fs::read_to_string(dir.path().join(CONFIG_FILE))
		.expect("Config file should be readable.");

	assert!(!contents.contains("secretabc"));

	for path in provisioner.scratch_paths() {
		assert!(!path.exists(), "Scratch directory {} should be removed.", path.display());
	}
}

#[test]
fn non_persistent_resolution_leaves_config_untouched() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:", BundleLayout::Nested));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::default()));
	let client_id = resolver.get_client_identifier(false).expect("Resolution should succeed.");

	assert_eq!(client_id.as_ref(), "clientid123");
	assert_eq!(read_back(dir.path(), Section::Identity, keys::CLIENT_ID), None);
}

#[test]
fn every_call_fetches_a_fresh_bundle() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:secretabc", BundleLayout::Flat));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::default()));

	resolver.resolve(false).expect("First resolution should succeed.");
	resolver.resolve(false).expect("Second resolution should succeed.");

	assert_eq!(provisioner.fetches(), 2);
}

#[test]
fn tampered_bundle_fails_and_still_cleans_up() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:secretabc", BundleLayout::Tampered));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::default()));
	let err = resolver.resolve(true).expect_err("Tampered ciphertext must be rejected.");

	assert!(matches!(err, Error::Crypto(CryptoError::TagMismatch)));
	assert_eq!(read_back(dir.path(), Section::Identity, keys::CLIENT_ID), None);

	let scratch = provisioner.scratch_paths();

	assert_eq!(scratch.len(), 1);
	assert!(!scratch[0].exists());
}

#[test]
fn missing_private_key_is_reported() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:secretabc", BundleLayout::MissingKey));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::default()));
	let err = resolver.resolve(true).expect_err("A bundle without its key must fail.");

	assert!(matches!(
		err,
		Error::Resolve(ResolveError::MissingArtifact { name: "private.pem" })
	));
	assert!(provisioner.scratch_paths().iter().all(|path| !path.exists()));
}

#[test]
fn prompt_failure_skips_the_fetch() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("clientid123:secretabc", BundleLayout::Flat));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::refusing()));
	let err = resolver.resolve(true).expect_err("A refused prompt must fail.");

	assert!(matches!(err, Error::Resolve(ResolveError::Prompt(_))));
	assert_eq!(provisioner.fetches(), 0);
}

#[test]
fn malformed_payload_is_rejected() {
	let dir = tempfile::tempdir().expect("Temp dir should be created.");
	let provisioner = Arc::new(FakeProvisioner::new("no-separator-here", BundleLayout::Flat));
	let resolver =
		resolver_for(dir.path(), provisioner.clone(), Arc::new(RecordingPrompter::default()));
	let err = resolver.resolve(true).expect_err("A payload without `:` must fail.");

	assert!(matches!(err, Error::Resolve(ResolveError::MalformedPlaintext { .. })));
	assert_eq!(read_back(dir.path(), Section::Identity, keys::CLIENT_ID), None);
}
