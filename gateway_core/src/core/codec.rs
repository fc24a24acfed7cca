//! Optional symmetric encrypt/decrypt of frame payloads.

use aes::Aes256;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

const PBKDF2_ITERATIONS: u32 = 100_000;
const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// Derives a fixed AES-256 key from a shared password and static salt, then
/// wraps/unwraps wire payloads with it. Mirrors the original gateway's
/// PBKDF2-HMAC-SHA256(100_000) + block-cipher scheme.
pub struct FrameCodec {
    key: [u8; KEY_LEN],
}

impl FrameCodec {
    /// Derive a codec from `password` and `salt`. Both are ASCII secrets
    /// configured out of band; there is no per-message salt rotation.
    pub fn new(password: &str, salt: &str) -> Self {
        let mut key = [0u8; KEY_LEN];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt.as_bytes(), PBKDF2_ITERATIONS, &mut key);
        Self { key }
    }

    /// Encrypt `plaintext`, returning a base64 string of `iv || ciphertext`.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let mut iv = [0u8; IV_LEN];
        rand::rng().fill_bytes(&mut iv);
        let cipher = Aes256CbcEnc::new(&self.key.into(), &iv.into());
        let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        base64::engine::general_purpose::STANDARD.encode(out)
    }

    /// Decrypt wire text. On ANY failure — not valid base64, too short to
    /// contain an IV, bad padding — this returns the input unchanged rather
    /// than an error. That preserves forward compatibility with clients
    /// that never encrypt: the caller's subsequent JSON parse will reject
    /// the bytes, which is the correct outcome.
    pub fn decrypt(&self, wire: &str) -> String {
        self.try_decrypt(wire).unwrap_or_else(|| wire.to_string())
    }

    fn try_decrypt(&self, wire: &str) -> Option<String> {
        let raw = base64::engine::general_purpose::STANDARD
            .decode(wire)
            .ok()?;
        if raw.len() < IV_LEN {
            return None;
        }
        let (iv, ciphertext) = raw.split_at(IV_LEN);
        let cipher = Aes256CbcDec::new(self.key.as_slice().into(), iv.into());
        let plaintext = cipher
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .ok()?;
        String::from_utf8(plaintext).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let codec = FrameCodec::new("shared-secret", "static-salt");
        let plaintext = r#"{"type":"message","content":"hello"}"#;
        let wire = codec.encrypt(plaintext);
        assert_eq!(codec.decrypt(&wire), plaintext);
    }

    #[test]
    fn non_ciphertext_passes_through_unchanged() {
        let codec = FrameCodec::new("shared-secret", "static-salt");
        let plain = r#"{"type":"message"}"#;
        assert_eq!(codec.decrypt(plain), plain);
    }

    #[test]
    fn wrong_key_falls_through_to_ciphertext() {
        let a = FrameCodec::new("password-a", "static-salt");
        let b = FrameCodec::new("password-b", "static-salt");
        let wire = a.encrypt("secret payload");
        // Wrong key almost always fails PKCS7 unpadding; when it doesn't,
        // the decoded bytes won't equal the plaintext either way.
        assert_ne!(b.decrypt(&wire), "secret payload");
    }
}
