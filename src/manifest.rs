//! Manifest cipher: the EtM construction specialised
//! for the `Manifest`, plus length-prefix obfuscation.
//!
//! The MAC covers `ciphertext || u32_LE(ciphertext_len) || serialised(
//! manifest_crypto_cfg without its own auth tag)` — the same fixed order
//! `etm::Encryptor`/`Decryptor` already implement, with the manifest-crypto
//! config's authenticatable clone as the "config bytes" input.

use crate::config::AuthenticationConfig;
use crate::error::PackageError;
use crate::etm::{Decryptor, Encryptor};
use crate::primitives::{new_cipher_stream, new_mac, Direction};
use crate::types::{Manifest, ManifestCryptoConfig};
use crate::wire;

/// Encrypts `manifest` under `(cipher_key, mac_key)` and the already
/// key-confirmed `crypto_cfg`. Returns `(ciphertext, mac_tag)`.
pub fn encrypt(
    manifest: &Manifest,
    crypto_cfg: &ManifestCryptoConfig,
    cipher_key: &[u8],
    mac_key: &[u8],
) -> Result<(Vec<u8>, Vec<u8>), PackageError> {
    let plaintext = wire::encode(manifest)?;
    let cipher = new_cipher_stream(crypto_cfg.cipher_cfg(), cipher_key, Direction::Encrypt)?;
    let mac = new_mac(crypto_cfg.authentication_cfg(), mac_key)?;
    let mut encryptor = Encryptor::new(cipher, mac);

    let mut ciphertext = encryptor.write(&plaintext);
    let config_bytes = wire::encode(&crypto_cfg.authenticatable_clone())?;
    let (tail, tag) = encryptor.finalize(b"", &config_bytes)?;
    ciphertext.extend(tail);

    Ok((ciphertext, tag))
}

/// Decrypts and verifies `ciphertext` against the stored manifest MAC tag
/// already present in `crypto_cfg.authentication_verified_output()`.
pub fn decrypt(
    ciphertext: &[u8],
    crypto_cfg: &ManifestCryptoConfig,
    cipher_key: &[u8],
    mac_key: &[u8],
) -> Result<Manifest, PackageError> {
    let cipher = new_cipher_stream(crypto_cfg.cipher_cfg(), cipher_key, Direction::Decrypt)?;
    let mac = new_mac(crypto_cfg.authentication_cfg(), mac_key)?;
    let mut decryptor = Decryptor::new(cipher, mac);

    let mut plaintext = decryptor.read(ciphertext);
    let config_bytes = wire::encode(&crypto_cfg.authenticatable_clone())?;
    let expected_tag = crypto_cfg.authentication_verified_output();
    plaintext.extend(decryptor.finalize(b"", &config_bytes, expected_tag)?);

    let manifest: Manifest = wire::decode(&plaintext)?;
    manifest.validate()?;
    Ok(manifest)
}

/// Obfuscates the manifest ciphertext's `u32` length prefix by XOR with
/// the first 4 bytes of the manifest MAC key. The caller
/// ensures `mac_key` is at least 4 bytes (every supported MAC/digest key
/// size here is — see `AuthenticationConfig::mac_key_size_bytes`).
pub fn obfuscated_length_prefix(ciphertext_len: u32, mac_key: &[u8]) -> [u8; 4] {
    wire::obfuscate_length(ciphertext_len, mac_key)
}

pub fn deobfuscate_length_prefix(obfuscated: [u8; 4], mac_key: &[u8]) -> u32 {
    wire::deobfuscate_length(obfuscated, mac_key)
}

/// Placeholder-sized manifest header for step 4 of the writer:
/// a `ManifestCryptoConfig` whose MAC field is a zero buffer of the
/// correct length, so the serialised size matches the eventual real one.
pub fn zeroed_authentication_output(authentication_cfg: &AuthenticationConfig) -> Vec<u8> {
    vec![0u8; authentication_cfg.output_bytes()]
}
