//! Key confirmation.
//!
//! `expected_output(cfg, key) = H(cfg.salt || key || cfg.nonce)`. For a
//! keyed MAC, `key` is the MAC key and `salt || nonce` is the authenticated
//! data; for an unkeyed digest, `key` is folded directly into the hashed
//! bytes alongside `salt`/`nonce`.

use subtle::ConstantTimeEq;

use crate::config::{AuthenticationConfig, KeyConfirmationConfig};
use crate::error::PackageError;
use crate::primitives;

pub fn expected_output(cfg: &KeyConfirmationConfig, key: &[u8]) -> Result<Vec<u8>, PackageError> {
    match &cfg.auth {
        AuthenticationConfig::Digest { .. } => {
            let mut mac = primitives::new_mac(&cfg.auth, &[])?;
            mac.update(&cfg.salt);
            mac.update(key);
            mac.update(&cfg.nonce);
            Ok(mac.finalize())
        }
        AuthenticationConfig::Mac { .. } => {
            let mut mac = primitives::new_mac(&cfg.auth, key)?;
            mac.update(&cfg.salt);
            mac.update(&cfg.nonce);
            Ok(mac.finalize())
        }
    }
}

/// Constant-time comparison against a stored tag.
pub fn matches(cfg: &KeyConfirmationConfig, key: &[u8], stored: &[u8]) -> bool {
    match expected_output(cfg, key) {
        Ok(computed) => {
            computed.len() == stored.len() && bool::from(computed.ct_eq(stored))
        }
        Err(_) => false,
    }
}

/// Scans a candidate list for the one key whose confirmation tag matches
/// `stored`. Runs every candidate regardless of where the match is found
/// (bounded by early `continue`, not early `return`) so running time does
/// not betray list position.
pub fn find_match<'a, T: AsRef<[u8]>>(
    cfg: &KeyConfirmationConfig,
    candidates: &'a [T],
    stored: &[u8],
) -> Option<&'a T> {
    let mut found: Option<&'a T> = None;
    for candidate in candidates {
        if matches(cfg, candidate.as_ref(), stored) {
            found = Some(candidate);
        }
    }
    found
}
