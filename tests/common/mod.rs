#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	fs, io,
	path::{Path, PathBuf},
	sync::{
		Arc, Mutex,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use httpmock::MockServer;
use oauth2::{HttpClientError, HttpRequest, HttpResponse, SyncHttpClient, http::StatusCode};
// self
use credential_bootstrap::{
	auth::{ClientId, TokenSecret},
	config::{ConfigStore, Section, keys},
	crypto::{Cipher, EncryptedBundle, HybridCipher, KeyPair},
	error::Result,
	flows::TokenAuthority,
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	prompt::{DeviceCodeNotice, Prompter},
	provider::IdentityDescriptor,
	provision::{
		HostKeyPolicy, ProvisionError, ProvisionTarget, RemoteLogin, RemoteProvisioner, ScratchDir,
	},
	resolver::ClientIdResolver,
	url::Url,
};

pub const CONFIG_FILE: &str = "config.toml";
pub const DEVICE_PATH: &str = "/contoso/oauth2/v2.0/devicecode";
pub const TOKEN_PATH: &str = "/contoso/oauth2/v2.0/token";
pub const PROBE_PATH: &str = "/v1.0/me";

/// Creates a config file with the standard identity and api keys.
pub fn write_config(dir: &Path, client_id: Option<&str>, access_token: Option<&str>) -> Arc<ConfigStore> {
	let store = ConfigStore::create(
		dir.join(CONFIG_FILE),
		[
			(Section::Identity, keys::CLIENT_ID, client_id),
			(Section::Identity, keys::TENANT_ID, Some("contoso")),
			(Section::Identity, keys::SCOPES, Some("User.Read offline_access")),
			(Section::Api, keys::HOSTNAME, Some("graph.example.test")),
			(Section::Api, keys::VERSION, Some("v1.0")),
			(Section::Api, keys::ACCESS_TOKEN, access_token),
		],
	)
	.expect("Test config should be created.");

	Arc::new(store)
}

/// Reads one value back from disk through a fresh store.
pub fn read_back(dir: &Path, section: Section, key: &str) -> Option<String> {
	ConfigStore::open(dir.join(CONFIG_FILE))
		.expect("Test config should reopen.")
		.read(section, key)
		.expect("Test config key should exist.")
}

/// Descriptor pointing every endpoint at the mock server.
pub fn mock_descriptor(server: &MockServer) -> IdentityDescriptor {
	let parse = |path: &str| Url::parse(&server.url(path)).expect("Mock endpoint should parse.");

	IdentityDescriptor::builder()
		.device_authorization_endpoint(parse(DEVICE_PATH))
		.token_endpoint(parse(TOKEN_PATH))
		.probe_endpoint(parse(PROBE_PATH))
		.build()
		.expect("Mock descriptor should build.")
}

/// Device authorization response body.
pub fn device_authorization_body(interval: u64, expires_in: u64) -> String {
	format!(
		"{{\"device_code\":\"device-code-1\",\"user_code\":\"TESTCODE\",\
		 \"verification_uri\":\"https://microsoft.com/devicelogin\",\"expires_in\":{expires_in},\
		 \"interval\":{interval},\"message\":\"To sign in, open https://microsoft.com/devicelogin and enter TESTCODE.\"}}"
	)
}

/// Token response body carrying `token`.
pub fn token_body(token: &str) -> String {
	format!("{{\"access_token\":\"{token}\",\"token_type\":\"Bearer\",\"expires_in\":3599}}")
}

/// Builds an authority on a fresh reqwest client, reading overrides from `token_env`.
pub fn build_authority(
	config: Arc<ConfigStore>,
	resolver: Arc<dyn ClientIdResolver>,
	prompter: Arc<dyn Prompter>,
	descriptor: IdentityDescriptor,
	token_env: &str,
) -> TokenAuthority<ReqwestHttpClient> {
	let http_client = ReqwestHttpClient::new().expect("Test HTTP client should build.");

	TokenAuthority::<ReqwestHttpClient>::with_http_client(config, resolver, prompter, descriptor, http_client)
		.expect("Authority should load its token source.")
		.with_token_env(token_env)
		.expect("Authority should reload its token source.")
}

/// Replays canned responses in order and records request paths and bodies.
///
/// Once the script runs out every further request fails at the transport level.
#[derive(Clone, Debug, Default)]
pub struct ScriptedHttpClient {
	responses: Arc<Mutex<VecDeque<(u16, String)>>>,
	requests: Arc<Mutex<Vec<(String, String)>>>,
}
impl ScriptedHttpClient {
	pub fn new<I>(responses: I) -> Self
	where
		I: IntoIterator<Item = (u16, String)>,
	{
		Self { responses: Arc::new(Mutex::new(responses.into_iter().collect())), ..Default::default() }
	}

	pub fn requests(&self) -> Vec<(String, String)> {
		self.requests.lock().expect("Request lock should not be poisoned.").clone()
	}
}
impl TokenHttpClient for ScriptedHttpClient {
	type Handle = ScriptedHandle;
	type TransportError = io::Error;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		ScriptedHandle { client: self.clone(), slot }
	}
}

pub struct ScriptedHandle {
	client: ScriptedHttpClient,
	slot: ResponseMetadataSlot,
}
impl SyncHttpClient for ScriptedHandle {
	type Error = HttpClientError<io::Error>;

	fn call(&self, request: HttpRequest) -> Result<HttpResponse, Self::Error> {
		self.slot.take();
		self.client.requests.lock().expect("Request lock should not be poisoned.").push((
			request.uri().path().to_owned(),
			String::from_utf8_lossy(request.body()).into_owned(),
		));

		let (status, body) = self
			.client
			.responses
			.lock()
			.expect("Response lock should not be poisoned.")
			.pop_front()
			.ok_or_else(|| HttpClientError::Other("script exhausted".into()))?;
		let mut response = HttpResponse::new(body.into_bytes());

		*response.status_mut() = StatusCode::from_u16(status).expect("Scripted status should be valid.");

		self.slot.store(ResponseMetadata { status: Some(status), retry_after: None });

		Ok(response)
	}
}

pub fn scripted_descriptor() -> IdentityDescriptor {
	let parse = |raw: &str| Url::parse(raw).expect("Scripted endpoint should parse.");

	IdentityDescriptor::builder()
		.device_authorization_endpoint(parse("https://login.example.test/contoso/oauth2/v2.0/devicecode"))
		.token_endpoint(parse("https://login.example.test/contoso/oauth2/v2.0/token"))
		.probe_endpoint(parse("https://graph.example.test/v1.0/me"))
		.build()
		.expect("Scripted descriptor should build.")
}

/// Builds an authority on a scripted transport, reading overrides from `token_env`.
pub fn build_scripted_authority(
	config: Arc<ConfigStore>,
	resolver: Arc<dyn ClientIdResolver>,
	prompter: Arc<dyn Prompter>,
	client: ScriptedHttpClient,
	token_env: &str,
) -> TokenAuthority<ScriptedHttpClient> {
	TokenAuthority::<ScriptedHttpClient>::with_http_client(
		config,
		resolver,
		prompter,
		scripted_descriptor(),
		client,
	)
	.expect("Authority should load its token source.")
	.with_token_env(token_env)
	.expect("Authority should reload its token source.")
}

/// Prompter that records device-code notices and answers login prompts from a script.
#[derive(Debug, Default)]
pub struct RecordingPrompter {
	pub notices: Mutex<Vec<DeviceCodeNotice>>,
	pub logins: AtomicUsize,
	pub refuse_login: bool,
}
impl RecordingPrompter {
	pub fn refusing() -> Self {
		Self { refuse_login: true, ..Default::default() }
	}

	pub fn notices(&self) -> Vec<DeviceCodeNotice> {
		self.notices.lock().expect("Notice lock should not be poisoned.").clone()
	}
}
impl Prompter for RecordingPrompter {
	fn remote_login(&self, _target: &ProvisionTarget) -> io::Result<RemoteLogin> {
		self.logins.fetch_add(1, Ordering::SeqCst);

		if self.refuse_login {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "stdin closed"));
		}

		Ok(RemoteLogin { username: "provisioner".into(), password: TokenSecret::new("hunter2") })
	}

	fn device_code(&self, notice: &DeviceCodeNotice) {
		self.notices.lock().expect("Notice lock should not be poisoned.").push(notice.clone());
	}
}

/// Resolver returning a fixed identifier and counting calls.
#[derive(Debug)]
pub struct CountingResolver {
	pub client_id: ClientId,
	pub calls: AtomicUsize,
}
impl CountingResolver {
	pub fn new(client_id: &str) -> Self {
		Self {
			client_id: ClientId::new(client_id).expect("Test client identifier should be valid."),
			calls: AtomicUsize::new(0),
		}
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}
}
impl ClientIdResolver for CountingResolver {
	fn get_client_identifier(&self, _persistent: bool) -> Result<ClientId> {
		self.calls.fetch_add(1, Ordering::SeqCst);

		Ok(self.client_id.clone())
	}
}

/// What the fake provisioner leaves in the scratch directory.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BundleLayout {
	/// Artifacts at the scratch root.
	#[default]
	Flat,
	/// Artifacts under one nested directory.
	Nested,
	/// Ciphertext with a flipped byte.
	Tampered,
	/// No private key.
	MissingKey,
}

/// Provisioner that seals a fresh bundle into a real scratch directory on every fetch.
#[derive(Debug)]
pub struct FakeProvisioner {
	pair: KeyPair,
	payload: String,
	layout: BundleLayout,
	fetches: AtomicUsize,
	scratch_paths: Mutex<Vec<PathBuf>>,
}
impl FakeProvisioner {
	pub fn new(payload: &str, layout: BundleLayout) -> Self {
		Self {
			pair: HybridCipher::default().generate_key_pair().expect("Key generation should succeed."),
			payload: payload.into(),
			layout,
			fetches: AtomicUsize::new(0),
			scratch_paths: Mutex::new(Vec::new()),
		}
	}

	pub fn fetches(&self) -> usize {
		self.fetches.load(Ordering::SeqCst)
	}

	pub fn scratch_paths(&self) -> Vec<PathBuf> {
		self.scratch_paths.lock().expect("Scratch lock should not be poisoned.").clone()
	}
}
impl RemoteProvisioner for FakeProvisioner {
	fn fetch_bundle(
		&self,
		_target: &ProvisionTarget,
		_login: &RemoteLogin,
	) -> std::result::Result<ScratchDir, ProvisionError> {
		self.fetches.fetch_add(1, Ordering::SeqCst);

		let scratch = ScratchDir::create()?;
		let dir = match self.layout {
			BundleLayout::Nested => scratch.path().join(".keys"),
			_ => scratch.path().to_path_buf(),
		};

		fs::create_dir_all(&dir).expect("Artifact directory should be created.");

		let mut bundle = HybridCipher::default()
			.encrypt(self.payload.as_bytes(), self.pair.public_key())
			.expect("Sealing should succeed.");

		if self.layout == BundleLayout::Tampered {
			bundle.ciphertext[0] ^= 0x01;
		}

		self.pair.write_pem(&dir).expect("Key files should be written.");
		bundle.write(&dir.join(EncryptedBundle::FILE_NAME)).expect("Bundle should be written.");

		if self.layout == BundleLayout::MissingKey {
			fs::remove_file(dir.join(KeyPair::PRIVATE_PEM)).expect("Private key should be removed.");
		}

		self.scratch_paths
			.lock()
			.expect("Scratch lock should not be poisoned.")
			.push(scratch.path().to_path_buf());

		Ok(scratch)
	}
}

/// Target used by resolver tests; never dialed.
pub fn test_target() -> ProvisionTarget {
	ProvisionTarget::new("provisioning.example.test", "/srv/provisioning/.keys", HostKeyPolicy::AcceptAny)
}
