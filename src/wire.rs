//! Wire-level constants and framing helpers.
//!
//! DTOs are framed with `bincode`: enum variants carry a little-endian
//! `u32` discriminant and `Vec`/`String` fields carry a length prefix —
//! `bincode`'s default configuration already does both, so there's no need
//! for a hand-rolled framing format on top.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::PackageError;

pub const HEADER_TAG: [u8; 8] = *b"OCpkgV1>";
pub const TRAILER_TAG: [u8; 8] = *b"<|OCpkg|";
pub const FORMAT_VERSION: u32 = 1;

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PackageError> {
    bincode::serialize(value).map_err(|e| PackageError::Format(format!("encode failed: {e}")))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, PackageError> {
    bincode::deserialize(bytes).map_err(|e| PackageError::Format(format!("decode failed: {e}")))
}

/// `ManifestHeader`s are framed with an 8-byte little-endian length prefix
/// ahead of the `bincode`-encoded bytes.
pub fn write_length_prefixed<W: std::io::Write>(sink: &mut W, bytes: &[u8]) -> Result<(), PackageError> {
    sink.write_all(&(bytes.len() as u64).to_le_bytes())?;
    sink.write_all(bytes)?;
    Ok(())
}

pub fn read_length_prefixed<R: std::io::Read>(source: &mut R) -> Result<Vec<u8>, PackageError> {
    let mut len_bytes = [0u8; 8];
    source.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes) as usize;
    let mut buf = vec![0u8; len];
    source.read_exact(&mut buf)?;
    Ok(buf)
}

/// Obfuscates (or de-obfuscates — XOR is its own inverse) the manifest
/// ciphertext length prefix with the first 4 bytes of the manifest MAC key.
pub fn obfuscate_length(len: u32, mac_key: &[u8]) -> [u8; 4] {
    let len_bytes = len.to_le_bytes();
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = len_bytes[i] ^ mac_key[i];
    }
    out
}

pub fn deobfuscate_length(obfuscated: [u8; 4], mac_key: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    for i in 0..4 {
        raw[i] = obfuscated[i] ^ mac_key[i];
    }
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_obfuscation_round_trips() {
        let key = [0x42u8; 32];
        let obf = obfuscate_length(123456, &key);
        assert_eq!(deobfuscate_length(obf, &key), 123456);
    }

    #[test]
    fn length_obfuscation_changes_the_bytes() {
        let key = [0xAAu8; 32];
        let obf = obfuscate_length(0, &key);
        assert_ne!(obf, [0u8; 4]);
    }
}
