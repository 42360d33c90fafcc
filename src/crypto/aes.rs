//! AES-256-GCM cipher provider, the default page cipher.

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use eyre::{ensure, eyre, Result};

use super::{CipherCtx, CipherKind, CipherProvider};

pub struct Aes256GcmProvider;

impl CipherProvider for Aes256GcmProvider {
    fn name(&self) -> &'static str {
        "aes-256-gcm"
    }

    fn version(&self) -> &'static str {
        "1.0"
    }

    fn cipher_id(&self) -> CipherKind {
        CipherKind::Aes256Gcm
    }

    fn key_size(&self) -> usize {
        32
    }

    fn iv_size(&self) -> usize {
        12
    }

    fn tag_size(&self) -> usize {
        16
    }

    fn block_size(&self) -> usize {
        16
    }

    fn init(&self, key: &[u8]) -> Result<Box<dyn CipherCtx>> {
        ensure!(
            key.len() == self.key_size(),
            "AES-256-GCM key must be {} bytes, got {}",
            self.key_size(),
            key.len()
        );
        Ok(Box::new(AesGcmCtx {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }))
    }

    fn self_test(&self) -> Result<()> {
        let ctx = self.init(&[0x42; 32])?;
        let plain = b"speedsql self test vector.......";
        let iv = [7u8; 12];
        let aad = b"page-0";

        let mut cipher = vec![0u8; plain.len()];
        let mut tag = [0u8; 16];
        ctx.encrypt(plain, &iv, aad, &mut cipher, &mut tag)?;
        ensure!(cipher != plain, "ciphertext equals plaintext");

        let mut round = vec![0u8; plain.len()];
        ctx.decrypt(&cipher, &iv, aad, &tag, &mut round)?;
        ensure!(round == plain, "round trip mismatch");

        let mut bad_tag = tag;
        bad_tag[0] ^= 1;
        ensure!(
            ctx.decrypt(&cipher, &iv, aad, &bad_tag, &mut round).is_err(),
            "tampered tag accepted"
        );
        Ok(())
    }
}

struct AesGcmCtx {
    cipher: Aes256Gcm,
}

impl CipherCtx for AesGcmCtx {
    fn encrypt(
        &self,
        plaintext: &[u8],
        iv: &[u8],
        aad: &[u8],
        ciphertext: &mut [u8],
        tag: &mut [u8],
    ) -> Result<()> {
        ciphertext.copy_from_slice(plaintext);
        let out_tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(iv), aad, ciphertext)
            .map_err(|_| eyre!("AES-GCM encryption failed"))?;
        tag.copy_from_slice(&out_tag);
        Ok(())
    }

    fn decrypt(
        &self,
        ciphertext: &[u8],
        iv: &[u8],
        aad: &[u8],
        tag: &[u8],
        plaintext: &mut [u8],
    ) -> Result<()> {
        plaintext.copy_from_slice(ciphertext);
        self.cipher
            .decrypt_in_place_detached(Nonce::from_slice(iv), aad, plaintext, Tag::from_slice(tag))
            .map_err(|_| eyre!("authentication tag mismatch"))
    }

    fn rekey(&mut self, new_key: &[u8]) -> Result<()> {
        ensure!(new_key.len() == 32, "AES-256-GCM key must be 32 bytes");
        self.cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(new_key));
        Ok(())
    }

    fn zeroize(&mut self) {
        self.cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&[0u8; 32]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{page_aad, page_iv};

    #[test]
    fn round_trip_with_page_binding() {
        let provider = Aes256GcmProvider;
        let ctx = provider.init(&[9u8; 32]).unwrap();

        let plain = vec![0xA5u8; 128];
        let mut cipher = vec![0u8; 128];
        let mut tag = [0u8; 16];
        ctx.encrypt(&plain, &page_iv(3), &page_aad(3), &mut cipher, &mut tag)
            .unwrap();

        let mut out = vec![0u8; 128];
        ctx.decrypt(&cipher, &page_iv(3), &page_aad(3), &tag, &mut out)
            .unwrap();
        assert_eq!(out, plain);

        // Same bytes presented as a different page must not authenticate.
        assert!(ctx
            .decrypt(&cipher, &page_iv(4), &page_aad(4), &tag, &mut out)
            .is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let provider = Aes256GcmProvider;
        let ctx = provider.init(&[1u8; 32]).unwrap();
        let other = provider.init(&[2u8; 32]).unwrap();

        let mut cipher = vec![0u8; 32];
        let mut tag = [0u8; 16];
        ctx.encrypt(&[7u8; 32], &page_iv(1), &page_aad(1), &mut cipher, &mut tag)
            .unwrap();

        let mut out = vec![0u8; 32];
        assert!(other
            .decrypt(&cipher, &page_iv(1), &page_aad(1), &tag, &mut out)
            .is_err());
    }

    #[test]
    fn rejects_short_key() {
        assert!(Aes256GcmProvider.init(&[0u8; 16]).is_err());
    }
}
