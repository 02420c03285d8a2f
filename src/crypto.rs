//! Hybrid public-key encryption for small credential payloads.
//!
//! A fresh 128-bit session key seals the payload with AES-EAX (16-byte nonce, 16-byte tag); the
//! session key itself is wrapped for the recipient with RSA-OAEP (SHA-1). The bundle layout is
//! interoperable with producers that use the same primitives, see [`EncryptedBundle`].

pub mod bundle;
pub mod key;

pub use bundle::*;
pub use key::*;

// std
use std::{fs, io};
// crates.io
use aes::Aes128;
use eax::{
	Eax,
	aead::{AeadInPlace, KeyInit, generic_array::GenericArray},
};
use rsa::{
	Oaep, RsaPrivateKey, RsaPublicKey,
	rand_core::{OsRng, RngCore},
};
use sha1::Sha1;
// self
use crate::_prelude::*;

/// Session key length in bytes (AES-128).
pub const SESSION_KEY_LEN: usize = 16;
/// Nonce length in bytes.
pub const NONCE_LEN: usize = 16;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Default RSA modulus size in bits.
pub const DEFAULT_KEY_BITS: usize = 2048;
/// Smallest RSA modulus accepted for new key pairs.
pub const MIN_KEY_BITS: usize = 2048;

type SessionCipher = Eax<Aes128>;

/// Cipher failures. None of them ever carries partial plaintext.
#[derive(Debug, ThisError)]
pub enum CryptoError {
	/// Requested modulus is below [`MIN_KEY_BITS`].
	#[error("RSA modulus of {bits} bits is below the {MIN_KEY_BITS}-bit minimum.")]
	KeyTooSmall {
		/// Requested modulus size.
		bits: usize,
	},
	/// Key pair generation failed.
	#[error("RSA key pair generation failed.")]
	KeyGeneration(#[source] rsa::Error),
	/// The session key could not be wrapped for the recipient.
	#[error("Session key could not be wrapped for the recipient.")]
	WrapFailed(#[source] rsa::Error),
	/// The payload could not be sealed.
	#[error("Payload could not be sealed.")]
	SealFailed,
	/// The wrapped session key could not be recovered with the provided private key.
	#[error("Session key could not be unwrapped; the private key does not match the bundle.")]
	UnwrapFailed(#[source] rsa::Error),
	/// The unwrapped session key has the wrong length.
	#[error("Unwrapped session key is {len} bytes; expected {SESSION_KEY_LEN}.")]
	InvalidSessionKey {
		/// Actual key length.
		len: usize,
	},
	/// The authentication tag did not verify; the bundle is corrupt or forged.
	#[error("Bundle authentication tag did not verify.")]
	TagMismatch,
	/// The serialized bundle is too short for its declared layout.
	#[error("Encrypted bundle is {len} bytes; at least {min} are required.")]
	MalformedBundle {
		/// Actual byte count.
		len: usize,
		/// Minimum byte count for the key size.
		min: usize,
	},
	/// A PEM document could not be encoded or decoded.
	#[error("Key encoding failed: {message}.")]
	KeyEncoding {
		/// Encoder/decoder diagnostic.
		message: String,
	},
	/// Reading or writing key material or a bundle failed.
	#[error("I/O failure on {}.", path.display())]
	Io {
		/// File involved.
		path: PathBuf,
		/// Underlying IO failure.
		#[source]
		source: io::Error,
	},
}
impl CryptoError {
	/// Stable reason label for logs.
	pub const fn reason(&self) -> &'static str {
		match self {
			Self::KeyTooSmall { .. } | Self::KeyGeneration(_) => "key-generation",
			Self::WrapFailed(_) => "wrap-failed",
			Self::SealFailed => "seal-failed",
			Self::UnwrapFailed(_) | Self::InvalidSessionKey { .. } => "unwrap-failed",
			Self::TagMismatch => "tag-mismatch",
			Self::MalformedBundle { .. } => "malformed-bundle",
			Self::KeyEncoding { .. } => "key-encoding",
			Self::Io { .. } => "io",
		}
	}

	fn io(path: &Path) -> impl FnOnce(io::Error) -> Self {
		let path = path.to_path_buf();

		move |source| Self::Io { path, source }
	}
}

/// Hybrid cipher contract: key generation plus seal/open of one payload.
pub trait Cipher: Send + Sync {
	/// Generates a fresh RSA key pair.
	fn generate_key_pair(&self) -> Result<KeyPair, CryptoError>;

	/// Seals `plaintext` for the holder of the private half of `recipient`.
	fn encrypt(
		&self,
		plaintext: &[u8],
		recipient: &RsaPublicKey,
	) -> Result<EncryptedBundle, CryptoError>;

	/// Opens a bundle. The tag is verified before any plaintext is returned.
	fn decrypt(
		&self,
		bundle: &EncryptedBundle,
		private_key: &RsaPrivateKey,
	) -> Result<Zeroizing<Vec<u8>>, CryptoError>;
}

/// RSA-OAEP(SHA-1) + AES-128-EAX implementation of [`Cipher`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HybridCipher {
	key_bits: usize,
}
impl HybridCipher {
	/// Creates a cipher generating keys of the provided modulus size.
	pub fn with_key_bits(key_bits: usize) -> Result<Self, CryptoError> {
		if key_bits < MIN_KEY_BITS {
			return Err(CryptoError::KeyTooSmall { bits: key_bits });
		}

		Ok(Self { key_bits })
	}

	/// Modulus size used for new key pairs.
	pub fn key_bits(&self) -> usize {
		self.key_bits
	}
}
impl Default for HybridCipher {
	fn default() -> Self {
		Self { key_bits: DEFAULT_KEY_BITS }
	}
}
impl Cipher for HybridCipher {
	fn generate_key_pair(&self) -> Result<KeyPair, CryptoError> {
		let private = RsaPrivateKey::new(&mut OsRng, self.key_bits).map_err(CryptoError::KeyGeneration)?;

		tracing::debug!(bits = self.key_bits, "Generated RSA key pair.");

		Ok(KeyPair::from_private(private))
	}

	fn encrypt(
		&self,
		plaintext: &[u8],
		recipient: &RsaPublicKey,
	) -> Result<EncryptedBundle, CryptoError> {
		let mut session_key = Zeroizing::new([0_u8; SESSION_KEY_LEN]);
		let mut nonce = [0_u8; NONCE_LEN];

		OsRng.fill_bytes(&mut session_key[..]);
		OsRng.fill_bytes(&mut nonce);

		let wrapped_key = recipient
			.encrypt(&mut OsRng, Oaep::new::<Sha1>(), &session_key[..])
			.map_err(CryptoError::WrapFailed)?;
		let cipher = SessionCipher::new_from_slice(&session_key[..])
			.map_err(|_| CryptoError::InvalidSessionKey { len: SESSION_KEY_LEN })?;
		let mut ciphertext = plaintext.to_vec();
		let tag = cipher
			.encrypt_in_place_detached(GenericArray::from_slice(&nonce), b"", &mut ciphertext)
			.map_err(|_| CryptoError::SealFailed)?;
		let mut tag_bytes = [0_u8; TAG_LEN];

		tag_bytes.copy_from_slice(&tag);

		Ok(EncryptedBundle { wrapped_key, nonce, tag: tag_bytes, ciphertext })
	}

	fn decrypt(
		&self,
		bundle: &EncryptedBundle,
		private_key: &RsaPrivateKey,
	) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
		let session_key = private_key
			.decrypt(Oaep::new::<Sha1>(), &bundle.wrapped_key)
			.map(Zeroizing::new)
			.map_err(CryptoError::UnwrapFailed)?;
		let cipher = SessionCipher::new_from_slice(&session_key)
			.map_err(|_| CryptoError::InvalidSessionKey { len: session_key.len() })?;
		let mut buffer = Zeroizing::new(bundle.ciphertext.clone());

		cipher
			.decrypt_in_place_detached(
				GenericArray::from_slice(&bundle.nonce),
				b"",
				&mut buffer[..],
				GenericArray::from_slice(&bundle.tag),
			)
			.map_err(|_| CryptoError::TagMismatch)?;

		Ok(buffer)
	}
}

/// Provisioning-side helper: generates a key pair, seals `client_id:secret`, and writes
/// `private.pem`, `receiver.pem`, and `encrypted_data.bin` into `dir`.
pub fn seal_credentials(
	cipher: &dyn Cipher,
	dir: &Path,
	client_id: &str,
	secret: &str,
) -> Result<KeyPair, CryptoError> {
	fs::create_dir_all(dir).map_err(CryptoError::io(dir))?;

	let pair = cipher.generate_key_pair()?;
	let plaintext = Zeroizing::new(format!("{client_id}:{secret}"));
	let bundle = cipher.encrypt(plaintext.as_bytes(), pair.public_key())?;

	pair.write_pem(dir)?;
	bundle.write(&dir.join(EncryptedBundle::FILE_NAME))?;

	tracing::info!(dir = %dir.display(), fingerprint = %pair.fingerprint()?, "Sealed credential bundle.");

	Ok(pair)
}
