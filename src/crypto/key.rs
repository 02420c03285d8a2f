//! RSA key pairs and their PEM artifacts.

// std
use std::{
	fs::{self, OpenOptions},
	io::Write,
};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use rsa::{
	RsaPrivateKey, RsaPublicKey,
	pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
	pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey, LineEnding},
	traits::PublicKeyParts,
};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, crypto::CryptoError};

/// RSA key pair. The private half never leaves the process except through [`write_pem`](Self::write_pem).
#[derive(Clone)]
pub struct KeyPair {
	private: RsaPrivateKey,
	public: RsaPublicKey,
}
impl KeyPair {
	/// PEM file holding the PKCS#1 private key.
	pub const PRIVATE_PEM: &str = "private.pem";
	/// PEM file holding the SubjectPublicKeyInfo public key.
	pub const PUBLIC_PEM: &str = "receiver.pem";

	/// Derives the public half from a private key.
	pub fn from_private(private: RsaPrivateKey) -> Self {
		let public = private.to_public_key();

		Self { private, public }
	}

	/// Private half.
	pub fn private_key(&self) -> &RsaPrivateKey {
		&self.private
	}

	/// Public half.
	pub fn public_key(&self) -> &RsaPublicKey {
		&self.public
	}

	/// Modulus size in bytes, which is also the wrapped session key length.
	pub fn key_size(&self) -> usize {
		self.public.size()
	}

	/// `SHA256:`-prefixed fingerprint of the DER-encoded public key.
	pub fn fingerprint(&self) -> Result<String, CryptoError> {
		public_key_fingerprint(&self.public)
	}

	/// Writes [`PRIVATE_PEM`](Self::PRIVATE_PEM) (owner-only on Unix) and
	/// [`PUBLIC_PEM`](Self::PUBLIC_PEM) into `dir`.
	pub fn write_pem(&self, dir: &Path) -> Result<(), CryptoError> {
		let private_pem = self.private.to_pkcs1_pem(LineEnding::LF).map_err(encoding)?;
		let public_pem = self.public.to_public_key_pem(LineEnding::LF).map_err(encoding)?;
		let private_path = dir.join(Self::PRIVATE_PEM);
		let public_path = dir.join(Self::PUBLIC_PEM);
		let mut options = OpenOptions::new();

		options.write(true).create(true).truncate(true);

		#[cfg(unix)]
		{
			use std::os::unix::fs::OpenOptionsExt;

			options.mode(0o600);
		}

		options
			.open(&private_path)
			.and_then(|mut file| file.write_all(private_pem.as_bytes()))
			.map_err(CryptoError::io(&private_path))?;
		fs::write(&public_path, public_pem).map_err(CryptoError::io(&public_path))
	}
}
impl Debug for KeyPair {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("KeyPair")
			.field("bits", &(self.key_size() * 8))
			.field("private", &"<redacted>")
			.finish()
	}
}

/// Reads a private key in PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM form.
pub fn read_private_key_pem(path: &Path) -> Result<RsaPrivateKey, CryptoError> {
	let pem = fs::read_to_string(path).map(Zeroizing::new).map_err(CryptoError::io(path))?;

	RsaPrivateKey::from_pkcs1_pem(&pem)
		.or_else(|_| RsaPrivateKey::from_pkcs8_pem(&pem))
		.map_err(encoding)
}

/// Reads a SubjectPublicKeyInfo (`PUBLIC KEY`) PEM document.
pub fn read_public_key_pem(path: &Path) -> Result<RsaPublicKey, CryptoError> {
	let pem = fs::read_to_string(path).map_err(CryptoError::io(path))?;

	RsaPublicKey::from_public_key_pem(&pem).map_err(encoding)
}

/// `SHA256:`-prefixed, unpadded base64 digest of the DER-encoded public key.
pub fn public_key_fingerprint(key: &RsaPublicKey) -> Result<String, CryptoError> {
	let der = key.to_public_key_der().map_err(encoding)?;
	let digest = Sha256::digest(der.as_bytes());

	Ok(format!("SHA256:{}", STANDARD_NO_PAD.encode(digest)))
}

fn encoding(e: impl Display) -> CryptoError {
	CryptoError::KeyEncoding { message: e.to_string() }
}
