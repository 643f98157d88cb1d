//! Streaming Encrypt-then-MAC decorator.
//!
//! Composes a `CipherStream` (inner) with a `RunningMac` (outer). Write
//! mode: plaintext → cipher → ciphertext → MAC absorbs ciphertext →
//! ciphertext returned to caller for writing to the sink. Read mode:
//! ciphertext arrives from the source → MAC absorbs a copy → cipher emits
//! plaintext.
//!
//! The MAC's fixed input order: all ciphertext bytes, then a
//! little-endian `u32` ciphertext-length prefix, then the serialised
//! authenticatable form of the enclosing config. Both `Encryptor` and
//! `Decryptor` feed the MAC in that order at `finalize`.

use subtle::ConstantTimeEq;

use crate::error::PackageError;
use crate::primitives::{CipherStream, RunningMac};

/// Write-direction EtM pipeline: plaintext in, ciphertext out, a tag at
/// the end.
pub struct Encryptor {
    cipher: Box<dyn CipherStream>,
    mac: Box<dyn RunningMac>,
    operation_size: usize,
    pending: Vec<u8>,
    bytes_in: u64,
    bytes_out: u64,
}

impl Encryptor {
    pub fn new(cipher: Box<dyn CipherStream>, mac: Box<dyn RunningMac>) -> Self {
        let operation_size = cipher.operation_size().max(1);
        Self { cipher, mac, operation_size, pending: Vec::new(), bytes_in: 0, bytes_out: 0 }
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Feeds bytes directly into the MAC without passing them through the
    /// cipher — used for Frameshift padding, which must be authenticated
    /// alongside the ciphertext it brackets but which is never itself
    /// encrypted.
    pub fn authenticate_extra(&mut self, bytes: &[u8]) {
        self.mac.update(bytes);
    }

    /// Encrypts as much of `plaintext` as divides evenly into
    /// `operation_size`, buffering any remainder for the next call or for
    /// `finalize`. Returns the ciphertext ready to hand to the sink.
    pub fn write(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.bytes_in += plaintext.len() as u64;
        self.pending.extend_from_slice(plaintext);
        let whole_len = self.pending.len() / self.operation_size * self.operation_size;
        let chunk: Vec<u8> = self.pending.drain(..whole_len).collect();
        if chunk.is_empty() {
            return Vec::new();
        }
        let ct = self.cipher.update(&chunk);
        self.bytes_out += ct.len() as u64;
        self.mac.update(&ct);
        ct
    }

    /// Flushes the final (possibly padded) block, feeds the MAC the fixed
    /// `(ciphertext, length prefix, config)` sequence, and returns the
    /// trailing ciphertext alongside the finished tag.
    ///
    /// `extra` is absorbed into the MAC right after the tail ciphertext and
    /// before the length prefix — the multiplexer's hook for authenticating
    /// Frameshift trailer padding, which must land at the same
    /// position in both `Encryptor` and `Decryptor`'s absorption order.
    /// Callers with nothing extra to authenticate (the manifest cipher,
    /// Simple/Fabric items) pass `b""`, which reproduces the unembellished
    /// `(ciphertext, length, config)` order.
    pub fn finalize(mut self, extra: &[u8], config_bytes: &[u8]) -> Result<(Vec<u8>, Vec<u8>), PackageError> {
        let tail = std::mem::take(&mut self.pending);
        let ct_tail = self.cipher.finalize(&tail)?;
        self.bytes_out += ct_tail.len() as u64;
        self.mac.update(&ct_tail);
        self.mac.update(extra);
        self.mac.update(&(self.bytes_out as u32).to_le_bytes());
        self.mac.update(config_bytes);
        let tag = self.mac.finalize();
        Ok((ct_tail, tag))
    }
}

/// Read-direction EtM pipeline: ciphertext in, plaintext out, verifies a
/// tag at the end.
pub struct Decryptor {
    cipher: Box<dyn CipherStream>,
    mac: Box<dyn RunningMac>,
    operation_size: usize,
    pending: Vec<u8>,
    bytes_in: u64,
    bytes_out: u64,
}

impl Decryptor {
    pub fn new(cipher: Box<dyn CipherStream>, mac: Box<dyn RunningMac>) -> Self {
        let operation_size = cipher.operation_size().max(1);
        Self { cipher, mac, operation_size, pending: Vec::new(), bytes_in: 0, bytes_out: 0 }
    }

    pub fn bytes_in(&self) -> u64 {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> u64 {
        self.bytes_out
    }

    /// Feeds bytes directly into the MAC without passing them through the
    /// cipher — the read-side counterpart of `Encryptor::authenticate_extra`,
    /// used to absorb Frameshift padding that was read straight off the
    /// source.
    pub fn authenticate_extra(&mut self, bytes: &[u8]) {
        self.mac.update(bytes);
    }

    /// Absorbs `ciphertext` into the MAC and returns the plaintext
    /// decrypted from whole `operation_size` chunks; any remainder is
    /// buffered for the next call or `finalize`.
    pub fn read(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        self.bytes_in += ciphertext.len() as u64;
        self.mac.update(ciphertext);
        self.pending.extend_from_slice(ciphertext);
        let whole_len = self.pending.len() / self.operation_size * self.operation_size;
        let chunk: Vec<u8> = self.pending.drain(..whole_len).collect();
        if chunk.is_empty() {
            return Vec::new();
        }
        let pt = self.cipher.update(&chunk);
        self.bytes_out += pt.len() as u64;
        pt
    }

    /// Feeds the MAC `extra` (see `Encryptor::finalize`), the length prefix
    /// and config, verifies `expected_tag` in constant time, then decrypts
    /// the buffered tail. Returns `AuthError` on mismatch, without exposing
    /// any plaintext.
    pub fn finalize(mut self, extra: &[u8], config_bytes: &[u8], expected_tag: &[u8]) -> Result<Vec<u8>, PackageError> {
        self.mac.update(extra);
        self.mac.update(&(self.bytes_in as u32).to_le_bytes());
        self.mac.update(config_bytes);
        let tag = self.mac.finalize();
        if tag.len() != expected_tag.len() || !bool::from(tag.ct_eq(expected_tag)) {
            return Err(PackageError::Auth);
        }
        let tail = std::mem::take(&mut self.pending);
        self.cipher.finalize(&tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CipherConfig, StreamCipherName};
    use crate::primitives::{new_cipher_stream, new_mac, Direction};
    use crate::config::{AuthenticationConfig, DigestName};

    fn stream_cfg() -> CipherConfig {
        CipherConfig::new_stream(StreamCipherName::ChaCha20, vec![0x09; 12]).unwrap()
    }

    fn mac_cfg() -> AuthenticationConfig {
        AuthenticationConfig::Digest { name: DigestName::Keccak256, salt: vec![], nonce: vec![] }
    }

    #[test]
    fn round_trips_and_verifies() {
        let key = [0x11u8; 32];
        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();

        let enc_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Encrypt).unwrap();
        let enc_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut encryptor = Encryptor::new(enc_cipher, enc_mac);

        let mut ct = encryptor.write(&plaintext[..20]);
        ct.extend(encryptor.write(&plaintext[20..]));
        let (tail, tag) = encryptor.finalize(b"", b"cfg-bytes").unwrap();
        ct.extend(tail);

        let dec_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Decrypt).unwrap();
        let dec_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut decryptor = Decryptor::new(dec_cipher, dec_mac);
        let mut pt = decryptor.read(&ct[..15]);
        pt.extend(decryptor.read(&ct[15..]));
        pt.extend(decryptor.finalize(b"", b"cfg-bytes", &tag).unwrap());

        assert_eq!(pt, plaintext);
    }

    #[test]
    fn tampered_ciphertext_fails_auth() {
        let key = [0x22u8; 32];
        let plaintext = b"short message".to_vec();

        let enc_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Encrypt).unwrap();
        let enc_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut encryptor = Encryptor::new(enc_cipher, enc_mac);
        let mut ct = encryptor.write(&plaintext);
        let (tail, tag) = encryptor.finalize(b"", b"cfg").unwrap();
        ct.extend(tail);
        ct[0] ^= 0x01;

        let dec_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Decrypt).unwrap();
        let dec_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut decryptor = Decryptor::new(dec_cipher, dec_mac);
        let _ = decryptor.read(&ct);
        let result = decryptor.finalize(b"", b"cfg", &tag);
        assert!(matches!(result, Err(PackageError::Auth)));
    }

    #[test]
    fn mismatched_config_bytes_fail_auth() {
        let key = [0x33u8; 32];
        let plaintext = b"data".to_vec();

        let enc_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Encrypt).unwrap();
        let enc_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut encryptor = Encryptor::new(enc_cipher, enc_mac);
        let mut ct = encryptor.write(&plaintext);
        let (tail, tag) = encryptor.finalize(b"", b"cfg-a").unwrap();
        ct.extend(tail);

        let dec_cipher = new_cipher_stream(&stream_cfg(), &key, Direction::Decrypt).unwrap();
        let dec_mac = new_mac(&mac_cfg(), &key).unwrap();
        let mut decryptor = Decryptor::new(dec_cipher, dec_mac);
        let _ = decryptor.read(&ct);
        let result = decryptor.finalize(b"", b"cfg-b", &tag);
        assert!(matches!(result, Err(PackageError::Auth)));
    }
}
