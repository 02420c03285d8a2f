//! Two-section TOML config file shared by every component.
//!
//! On disk every value is a string and the literal [`UNSET_SENTINEL`] marks a value that has not
//! been provisioned yet. In memory the sentinel becomes `None` and never leaves this module.
//! Writes re-read the file, patch one key, and replace the file atomically through a sibling `<name>.tmp`, so
//! unrelated sections and keys survive.

// std
use std::{
	ffi::OsStr,
	fs::{self, File},
	io::{ErrorKind, Write},
};
// crates.io
use toml::{Table, Value};
// self
use crate::{
	_prelude::*,
	auth::{ClientId, ScopeSet, TenantId, TokenSecret},
	error::ConfigError,
};

/// Literal stored on disk for a value that has not been provisioned.
pub const UNSET_SENTINEL: &str = "None";

/// Key names used by the standard sections.
pub mod keys {
	/// `identity.client_id`: public identifier of the registered application.
	pub const CLIENT_ID: &str = "client_id";
	/// `identity.tenant_id`: directory tenant that owns the registration.
	pub const TENANT_ID: &str = "tenant_id";
	/// `identity.scopes`: space-delimited scopes requested during the exchange.
	pub const SCOPES: &str = "scopes";
	/// `api.hostname`: host of the protected API.
	pub const HOSTNAME: &str = "hostname";
	/// `api.version`: API version path segment.
	pub const VERSION: &str = "version";
	/// `api.access_token`: persisted bearer token.
	pub const ACCESS_TOKEN: &str = "access_token";
}

/// Config file sections.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Section {
	/// Application identity used by the device-code exchange.
	Identity,
	/// Protected API location and the persisted access token.
	Api,
}
impl Section {
	/// Every section, in file order.
	pub const ALL: [Self; 2] = [Self::Identity, Self::Api];

	/// Returns the TOML table name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Identity => "identity",
			Self::Api => "api",
		}
	}

	/// Keys that are always present in this section.
	pub const fn keys(self) -> &'static [&'static str] {
		match self {
			Self::Identity => &[keys::CLIENT_ID, keys::TENANT_ID, keys::SCOPES],
			Self::Api => &[keys::HOSTNAME, keys::VERSION, keys::ACCESS_TOKEN],
		}
	}
}
impl Display for Section {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Typed view over the `identity` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentitySettings {
	/// Registered application identifier; `None` until the resolver provisions it.
	pub client_id: Option<ClientId>,
	/// Directory tenant; required.
	pub tenant_id: TenantId,
	/// Scopes requested during the device-code exchange.
	pub scopes: ScopeSet,
}

/// Typed view over the `api` section.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiSettings {
	/// Host of the protected API, e.g. `graph.microsoft.com`.
	pub hostname: String,
	/// API version path segment, e.g. `v1.0`.
	pub version: String,
	/// Persisted bearer token; `None` until the first exchange.
	pub access_token: Option<TokenSecret>,
}

/// File-backed config store with an in-process snapshot.
#[derive(Debug)]
pub struct ConfigStore {
	path: PathBuf,
	snapshot: RwLock<Table>,
}
impl ConfigStore {
	/// Opens an existing config file. A missing or unparsable file is an error.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
		let path = path.into();
		let snapshot = load(&path)?;

		tracing::debug!(path = %path.display(), "Loaded configuration.");

		Ok(Self { path, snapshot: RwLock::new(snapshot) })
	}

	/// Writes a fresh config file and opens it.
	///
	/// Standard keys missing from `entries` are written as the unset sentinel. An existing file
	/// is never overwritten.
	pub fn create<'a, I>(path: impl Into<PathBuf>, entries: I) -> Result<Self, ConfigError>
	where
		I: IntoIterator<Item = (Section, &'a str, Option<&'a str>)>,
	{
		let path = path.into();

		if path.exists() {
			return Err(ConfigError::AlreadyExists { path });
		}

		let mut table = Table::new();

		for section in Section::ALL {
			for key in section.keys() {
				set_value(&mut table, section, key, None)?;
			}
		}
		for (section, key, value) in entries {
			set_value(&mut table, section, key, value)?;
		}

		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent)
				.map_err(|source| ConfigError::Write { path: parent.to_path_buf(), source })?;
		}

		persist(&path, &table)?;

		Ok(Self { path, snapshot: RwLock::new(table) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Re-reads the backing file, replacing the in-process snapshot.
	pub fn reload(&self) -> Result<(), ConfigError> {
		let table = load(&self.path)?;

		*self.snapshot.write() = table;

		Ok(())
	}

	/// Reads one value. The unset sentinel reads as `None`; an absent key is an error.
	pub fn read(&self, section: Section, key: &str) -> Result<Option<String>, ConfigError> {
		let guard = self.snapshot.read();
		let value = guard
			.get(section.as_str())
			.and_then(Value::as_table)
			.and_then(|table| table.get(key))
			.ok_or_else(|| ConfigError::MissingKey { section, key: key.to_owned() })?;
		let Value::String(raw) = value else {
			return Err(ConfigError::InvalidValue {
				section,
				key: key.to_owned(),
				reason: format!("expected a string, found {}", value.type_str()),
			});
		};

		Ok((raw != UNSET_SENTINEL).then(|| raw.clone()))
	}

	/// Persists one value, `None` being written as the unset sentinel.
	///
	/// The file is re-read first so edits made since [`open`](Self::open) are kept.
	pub fn write(&self, section: Section, key: &str, value: Option<&str>) -> Result<(), ConfigError> {
		let mut guard = self.snapshot.write();
		let mut table = load(&self.path)?;

		set_value(&mut table, section, key, value)?;
		persist(&self.path, &table)?;

		*guard = table;

		tracing::debug!(
			path = %self.path.display(),
			section = section.as_str(),
			key,
			provisioned = value.is_some(),
			"Persisted configuration value."
		);

		Ok(())
	}

	/// Typed view over the `identity` section.
	pub fn identity(&self) -> Result<IdentitySettings, ConfigError> {
		let client_id = self.read(Section::Identity, keys::CLIENT_ID)?.map(ClientId::new).transpose()?;
		let tenant_id = TenantId::new(self.require(Section::Identity, keys::TENANT_ID)?)?;
		let scopes = match self.read(Section::Identity, keys::SCOPES)? {
			Some(raw) => raw.parse()?,
			None => ScopeSet::default(),
		};

		Ok(IdentitySettings { client_id, tenant_id, scopes })
	}

	/// Typed view over the `api` section.
	pub fn api(&self) -> Result<ApiSettings, ConfigError> {
		Ok(ApiSettings {
			hostname: self.require(Section::Api, keys::HOSTNAME)?,
			version: self.require(Section::Api, keys::VERSION)?,
			access_token: self.read(Section::Api, keys::ACCESS_TOKEN)?.map(TokenSecret::new),
		})
	}

	fn require(&self, section: Section, key: &str) -> Result<String, ConfigError> {
		self.read(section, key)?.ok_or_else(|| ConfigError::Unset { section, key: key.to_owned() })
	}
}

fn load(path: &Path) -> Result<Table, ConfigError> {
	let raw = fs::read_to_string(path).map_err(|source| match source.kind() {
		ErrorKind::NotFound => ConfigError::Missing { path: path.to_path_buf() },
		_ => ConfigError::Read { path: path.to_path_buf(), source },
	})?;

	toml::from_str(&raw).map_err(|source| ConfigError::Corrupt { path: path.to_path_buf(), source })
}

fn persist(path: &Path, table: &Table) -> Result<(), ConfigError> {
	let serialized = toml::to_string(table)?;
	let tmp_path = tmp_path(path);

	{
		let write_err = |source| ConfigError::Write { path: tmp_path.clone(), source };
		let mut file = File::create(&tmp_path).map_err(write_err)?;

		file.write_all(serialized.as_bytes()).map_err(write_err)?;
		file.sync_all().map_err(write_err)?;
	}

	fs::rename(&tmp_path, path).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
}

/// Sibling staging file: `config.toml` is staged as `config.toml.tmp`.
fn tmp_path(path: &Path) -> PathBuf {
	let mut name = path.file_name().map(OsStr::to_os_string).unwrap_or_default();

	name.push(".tmp");

	path.with_file_name(name)
}

fn set_value(
	table: &mut Table,
	section: Section,
	key: &str,
	value: Option<&str>,
) -> Result<(), ConfigError> {
	if !table.contains_key(section.as_str()) {
		table.insert(section.as_str().to_owned(), Value::Table(Table::new()));
	}

	let section_table = table.get_mut(section.as_str()).and_then(Value::as_table_mut).ok_or_else(
		|| ConfigError::InvalidValue {
			section,
			key: key.to_owned(),
			reason: "section is not a table".into(),
		},
	)?;

	section_table
		.insert(key.to_owned(), Value::String(value.unwrap_or(UNSET_SENTINEL).to_owned()));

	Ok(())
}
