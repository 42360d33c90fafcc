//! # Page Encryption
//!
//! Pluggable authenticated encryption for the buffer pool. A
//! [`CipherProvider`] describes an algorithm (sizes, identity, self test)
//! and mints [`CipherCtx`] instances holding key material; the buffer pool
//! drives the context for every page transfer. Providers are plain values
//! carried by the connection; there is no process-global registry.
//!
//! Two providers are built in: AES-256-GCM (the default) and
//! ChaCha20-Poly1305. Both are AEADs with a 32-byte key, 12-byte IV and
//! 16-byte tag.
//!
//! ## IV derivation
//!
//! The IV for a page is derived deterministically from its page id:
//! little-endian id in bytes 0..8, the ASCII bytes `S`, `Q`, `L` in bytes
//! 8..11, zero in byte 11. Uniqueness across pages follows from page-id
//! uniqueness, but a key that encrypts two *different images of the same
//! page* reuses an IV, and pages are rewritten in place. Treat the
//! encryption as at-rest protection, and rotate keys with `rekey` (which
//! re-encrypts every live page) when the write history of a key matters.
//!
//! ## Key derivation
//!
//! Passwords are stretched with PBKDF2-SHA256 (default 100 000 iterations)
//! over the configured salt. Derived keys and context key material are
//! zeroized on drop.

mod aes;
mod chacha;

pub use aes::Aes256GcmProvider;
pub use chacha::ChaCha20Poly1305Provider;

use eyre::Result;
use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::error::{db_err, ErrorCode};
use crate::storage::PageId;

/// Cipher algorithm identifiers. Stable values, persisted in key metadata.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherKind {
    None = 0,
    Aes256Gcm = 1,
    ChaCha20Poly1305 = 7,
}

/// Key derivation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kdf {
    /// Use the password bytes directly (must match the cipher key size).
    Raw,
    Pbkdf2Sha256,
}

pub const SALT_SIZE: usize = 32;
pub const DEFAULT_KDF_ITERATIONS: u32 = 100_000;

/// Fixed default salt for password-derived keys. Callers that need a
/// per-database salt supply one through `CryptoConfig`.
pub const DEFAULT_SALT: [u8; SALT_SIZE] = *b"SpeedSQL.page.key.derivation.v1\0";

/// Encryption configuration passed to `key_v2`.
#[derive(Debug, Clone)]
pub struct CryptoConfig {
    pub cipher: CipherKind,
    pub kdf: Kdf,
    pub kdf_iterations: u32,
    pub salt: [u8; SALT_SIZE],
}

impl Default for CryptoConfig {
    fn default() -> Self {
        CryptoConfig {
            cipher: CipherKind::Aes256Gcm,
            kdf: Kdf::Pbkdf2Sha256,
            kdf_iterations: DEFAULT_KDF_ITERATIONS,
            salt: DEFAULT_SALT,
        }
    }
}

/// A cipher algorithm. Mints contexts and advertises its parameters.
pub trait CipherProvider: Send + Sync {
    fn name(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn cipher_id(&self) -> CipherKind;
    fn key_size(&self) -> usize;
    fn iv_size(&self) -> usize;
    fn tag_size(&self) -> usize;
    fn block_size(&self) -> usize;

    fn init(&self, key: &[u8]) -> Result<Box<dyn CipherCtx>>;

    /// Known-answer round trip; run before first use.
    fn self_test(&self) -> Result<()>;
}

/// Keyed cipher state driven by the buffer pool.
pub trait CipherCtx: Send {
    /// Encrypts `plaintext` into `ciphertext` (same length) and writes the
    /// authentication tag.
    fn encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &mut [u8],
        tag: &mut [u8],
    ) -> Result<()>;

    /// Decrypts and authenticates; any mismatch is an error.
    fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        aad: &[u8],
        tag: &[u8],
        plaintext: &mut [u8],
    ) -> Result<()>;

    fn rekey(&mut self, new_key: &[u8]) -> Result<()>;

    /// Clears key material ahead of drop.
    fn zeroize(&mut self);
}

/// Deterministic per-page IV; see the module docs for the caveat.
pub fn page_iv(page_id: PageId) -> [u8; 12] {
    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(&page_id.to_le_bytes());
    iv[8] = b'S';
    iv[9] = b'Q';
    iv[10] = b'L';
    iv
}

/// AAD binds the ciphertext to its page id.
pub fn page_aad(page_id: PageId) -> [u8; 8] {
    page_id.to_le_bytes()
}

/// Looks up a built-in provider.
pub fn provider_for(kind: CipherKind) -> Result<Box<dyn CipherProvider>> {
    match kind {
        CipherKind::Aes256Gcm => Ok(Box::new(Aes256GcmProvider)),
        CipherKind::ChaCha20Poly1305 => Ok(Box::new(ChaCha20Poly1305Provider)),
        CipherKind::None => Err(db_err(ErrorCode::Misuse, "cipher 'none' has no provider")),
    }
}

/// Stretches a password into a key of `key_len` bytes.
pub fn derive_key(password: &[u8], config: &CryptoConfig, key_len: usize) -> Result<Zeroizing<Vec<u8>>> {
    match config.kdf {
        Kdf::Raw => {
            if password.len() != key_len {
                return Err(db_err(
                    ErrorCode::Misuse,
                    format!("raw key must be {} bytes, got {}", key_len, password.len()),
                ));
            }
            Ok(Zeroizing::new(password.to_vec()))
        }
        Kdf::Pbkdf2Sha256 => {
            if config.kdf_iterations == 0 {
                return Err(db_err(ErrorCode::Misuse, "KDF iteration count is zero"));
            }
            let mut key = Zeroizing::new(vec![0u8; key_len]);
            pbkdf2_hmac::<Sha256>(password, &config.salt, config.kdf_iterations, &mut key);
            Ok(key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iv_layout() {
        let iv = page_iv(0x0102030405060708);
        assert_eq!(&iv[..8], &[0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01]);
        assert_eq!(&iv[8..11], b"SQL");
        assert_eq!(iv[11], 0);
    }

    #[test]
    fn ivs_are_unique_per_page() {
        assert_ne!(page_iv(1), page_iv(2));
        assert_eq!(page_iv(7), page_iv(7));
    }

    #[test]
    fn derive_key_is_deterministic() {
        let config = CryptoConfig::default();
        let a = derive_key(b"password", &config, 32).unwrap();
        let b = derive_key(b"password", &config, 32).unwrap();
        let c = derive_key(b"other", &config, 32).unwrap();

        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn salt_changes_derived_key() {
        let mut other = CryptoConfig::default();
        other.salt[0] ^= 0xFF;

        let a = derive_key(b"pw", &CryptoConfig::default(), 32).unwrap();
        let b = derive_key(b"pw", &other, 32).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn raw_kdf_requires_exact_length() {
        let config = CryptoConfig {
            kdf: Kdf::Raw,
            ..CryptoConfig::default()
        };
        assert!(derive_key(&[0u8; 32], &config, 32).is_ok());
        assert!(derive_key(&[0u8; 16], &config, 32).is_err());
    }

    #[test]
    fn builtin_providers_pass_self_test() {
        provider_for(CipherKind::Aes256Gcm)
            .unwrap()
            .self_test()
            .unwrap();
        provider_for(CipherKind::ChaCha20Poly1305)
            .unwrap()
            .self_test()
            .unwrap();
    }
}
