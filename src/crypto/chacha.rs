//! ChaCha20-Poly1305 cipher provider.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use eyre::{ensure, eyre, Result};

use super::{CipherCtx, CipherKind, CipherProvider};

pub struct ChaCha20Poly1305Provider;

impl CipherProvider for ChaCha20Poly1305Provider {
    fn name(&self) -> &'static str {
        "chacha20-poly1305"
    }

    fn version(&self) -> &'static str {
        "1.0"
    }

    fn cipher_id(&self) -> CipherKind {
        CipherKind::ChaCha20Poly1305
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
        1 // stream cipher
    }

    fn init(&self, key: &[u8]) -> Result<Box<dyn CipherCtx>> {
        ensure!(
            key.len() == self.key_size(),
            "ChaCha20-Poly1305 key must be {} bytes, got {}",
            self.key_size(),
            key.len()
        );
        Ok(Box::new(ChaChaCtx {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }))
    }

    fn self_test(&self) -> Result<()> {
        let ctx = self.init(&[0x24; 32])?;
        let plain = b"speedsql chacha self test block.";
        let iv = [3u8; 12];

        let mut cipher = vec![0u8; plain.len()];
        let mut tag = [0u8; 16];
        ctx.encrypt(plain, &iv, b"aad", &mut cipher, &mut tag)?;

        let mut round = vec![0u8; plain.len()];
        ctx.decrypt(&cipher, &iv, b"aad", &tag, &mut round)?;
        ensure!(round == plain, "round trip mismatch");

        cipher[0] ^= 1;
        ensure!(
            ctx.decrypt(&cipher, &iv, b"aad", &tag, &mut round).is_err(),
            "tampered ciphertext accepted"
        );
        Ok(())
    }
}

struct ChaChaCtx {
    cipher: ChaCha20Poly1305,
}

impl CipherCtx for ChaChaCtx {
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
            .map_err(|_| eyre!("ChaCha20-Poly1305 encryption failed"))?;
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
        ensure!(new_key.len() == 32, "ChaCha20-Poly1305 key must be 32 bytes");
        self.cipher = ChaCha20Poly1305::new(Key::from_slice(new_key));
        Ok(())
    }

    fn zeroize(&mut self) {
        self.cipher = ChaCha20Poly1305::new(Key::from_slice(&[0u8; 32]));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_from_aes_output() {
        let plain = [0x11u8; 64];
        let iv = [0u8; 12];

        let chacha = ChaCha20Poly1305Provider.init(&[5u8; 32]).unwrap();
        let mut c1 = vec![0u8; 64];
        let mut t1 = [0u8; 16];
        chacha.encrypt(&plain, &iv, b"", &mut c1, &mut t1).unwrap();

        let aes = crate::crypto::Aes256GcmProvider.init(&[5u8; 32]).unwrap();
        let mut c2 = vec![0u8; 64];
        let mut t2 = [0u8; 16];
        aes.encrypt(&plain, &iv, b"", &mut c2, &mut t2).unwrap();

        assert_ne!(c1, c2);
    }

    #[test]
    fn rekey_changes_output() {
        let provider = ChaCha20Poly1305Provider;
        let mut ctx = provider.init(&[1u8; 32]).unwrap();

        let plain = [9u8; 32];
        let iv = [2u8; 12];
        let mut before = vec![0u8; 32];
        let mut tag = [0u8; 16];
        ctx.encrypt(&plain, &iv, b"", &mut before, &mut tag).unwrap();

        ctx.rekey(&[8u8; 32]).unwrap();
        let mut after = vec![0u8; 32];
        ctx.encrypt(&plain, &iv, b"", &mut after, &mut tag).unwrap();

        assert_ne!(before, after);
    }
}
