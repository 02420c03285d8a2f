//! Serialized layout of a sealed payload.

// std
use std::fs;
// self
use crate::{
	_prelude::*,
	crypto::{CryptoError, NONCE_LEN, TAG_LEN},
};

/// Sealed payload: `wrapped_key ‖ nonce ‖ tag ‖ ciphertext`.
///
/// `wrapped_key` is exactly the recipient modulus size in bytes; `nonce` and `tag` are 16 bytes
/// each; the ciphertext takes the remainder and may be empty.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptedBundle {
	/// Session key wrapped with RSA-OAEP.
	pub wrapped_key: Vec<u8>,
	/// EAX nonce.
	pub nonce: [u8; NONCE_LEN],
	/// EAX authentication tag.
	pub tag: [u8; TAG_LEN],
	/// Sealed payload.
	pub ciphertext: Vec<u8>,
}
impl EncryptedBundle {
	/// Artifact name used inside a provisioning directory.
	pub const FILE_NAME: &str = "encrypted_data.bin";

	/// Serializes the bundle in its fixed byte order.
	pub fn to_bytes(&self) -> Vec<u8> {
		let mut bytes =
			Vec::with_capacity(self.wrapped_key.len() + NONCE_LEN + TAG_LEN + self.ciphertext.len());

		bytes.extend_from_slice(&self.wrapped_key);
		bytes.extend_from_slice(&self.nonce);
		bytes.extend_from_slice(&self.tag);
		bytes.extend_from_slice(&self.ciphertext);

		bytes
	}

	/// Parses a bundle whose wrapped key is `key_size` bytes long.
	pub fn from_bytes(bytes: &[u8], key_size: usize) -> Result<Self, CryptoError> {
		let min = key_size + NONCE_LEN + TAG_LEN;

		if bytes.len() < min {
			return Err(CryptoError::MalformedBundle { len: bytes.len(), min });
		}

		let (wrapped_key, rest) = bytes.split_at(key_size);
		let (nonce, rest) = rest.split_at(NONCE_LEN);
		let (tag, ciphertext) = rest.split_at(TAG_LEN);
		let mut bundle = Self {
			wrapped_key: wrapped_key.to_vec(),
			nonce: [0; NONCE_LEN],
			tag: [0; TAG_LEN],
			ciphertext: ciphertext.to_vec(),
		};

		bundle.nonce.copy_from_slice(nonce);
		bundle.tag.copy_from_slice(tag);

		Ok(bundle)
	}

	/// Reads and parses a bundle artifact.
	pub fn read(path: &Path, key_size: usize) -> Result<Self, CryptoError> {
		let bytes = fs::read(path).map_err(CryptoError::io(path))?;

		Self::from_bytes(&bytes, key_size)
	}

	/// Writes the serialized bundle.
	pub fn write(&self, path: &Path) -> Result<(), CryptoError> {
		fs::write(path, self.to_bytes()).map_err(CryptoError::io(path))
	}
}
impl Debug for EncryptedBundle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EncryptedBundle")
			.field("wrapped_key_len", &self.wrapped_key.len())
			.field("ciphertext_len", &self.ciphertext.len())
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn layout_is_key_nonce_tag_ciphertext() {
		let bundle = EncryptedBundle {
			wrapped_key: vec![1; 4],
			nonce: [2; NONCE_LEN],
			tag: [3; TAG_LEN],
			ciphertext: vec![4, 5],
		};
		let bytes = bundle.to_bytes();

		assert_eq!(bytes.len(), 4 + NONCE_LEN + TAG_LEN + 2);
		assert_eq!(&bytes[..4], &[1; 4]);
		assert_eq!(bytes[4], 2);
		assert_eq!(bytes[4 + NONCE_LEN], 3);
		assert_eq!(&bytes[bytes.len() - 2..], &[4, 5]);
		assert_eq!(EncryptedBundle::from_bytes(&bytes, 4).expect("Bundle should parse."), bundle);
	}

	#[test]
	fn truncated_bundle_is_malformed() {
		let err = EncryptedBundle::from_bytes(&[0; 256 + NONCE_LEN], 256)
			.expect_err("Missing tag bytes must be rejected.");

		assert!(matches!(err, CryptoError::MalformedBundle { len: 272, min: 288 }));
	}
}
