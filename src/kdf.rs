//! Key stretcher.
//!
//! `stretch` derives `cipher_key_len + mac_key_len` bytes from a pre-key
//! via the configured KDF (`crate::primitives::derive`), splitting the
//! output into a cipher key and a MAC key.

use zeroize::Zeroizing;

use crate::config::KeyDerivationConfig;
use crate::error::PackageError;
use crate::primitives;

pub struct StretchedKey {
    pub cipher_key: Zeroizing<Vec<u8>>,
    pub mac_key: Zeroizing<Vec<u8>>,
}

/// Derives `cipher_key_len + mac_key_len` bytes from `pre_key || salt`
/// (the salt lives inside `kdf_cfg`) and splits them into a cipher key and
/// a MAC key. The derived buffer is zeroed on drop via `Zeroizing`; the
/// caller owns zeroing of `pre_key` itself (it may be tried against
/// several configs during key confirmation, so this function borrows
/// rather than consumes it).
pub fn stretch(
    pre_key: &[u8],
    cipher_key_len: usize,
    mac_key_len: usize,
    kdf_cfg: &KeyDerivationConfig,
) -> Result<StretchedKey, PackageError> {
    kdf_cfg.validate()?;
    let total = cipher_key_len + mac_key_len;
    let mut derived = Zeroizing::new(primitives::derive(pre_key, total, kdf_cfg)?);

    let mac_key = Zeroizing::new(derived[cipher_key_len..].to_vec());
    derived.truncate(cipher_key_len);
    let cipher_key = derived;

    Ok(StretchedKey { cipher_key, mac_key })
}
