//! Package data model: `Manifest`, `PayloadItem`, `PayloadConfig`,
//! `ManifestHeader`, `ManifestCryptoConfig`.
//!
//! These DTOs are never exposed in plaintext outside the writer/reader —
//! only `crate::manifest` may see a decrypted `Manifest`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AuthenticationConfig, CipherConfig, KeyConfirmationConfig, KeyDerivationConfig};
use crate::error::PackageError;

/// Item classification. Only `File` items participate in the path-safety
/// check; `KeyAction` items (e.g. carrying wrapped sub-keys) are
/// exempt from the `..`-segment restriction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    File,
    KeyAction,
}

impl ItemKind {
    pub fn is_filesystem(&self) -> bool {
        matches!(self, Self::File)
    }
}

/// `PayloadItem`. `cipher_key`/`authentication_key` carry direct
/// keys when the item does not use its own KDF over a pre-key; exactly one
/// of (direct keys) or (`kdf_cfg` + a registered pre-key, tracked outside
/// the manifest by identifier) must be available at write/read time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayloadItem {
    pub identifier: Uuid,
    pub kind: ItemKind,
    pub relative_path: String,
    pub external_length: u64,
    pub internal_length: u64,
    pub cipher_cfg: CipherConfig,
    pub authentication_cfg: AuthenticationConfig,
    pub cipher_key: Option<Vec<u8>>,
    pub authentication_key: Option<Vec<u8>>,
    pub kdf_cfg: Option<KeyDerivationConfig>,
    pub key_confirmation_cfg: Option<KeyConfirmationConfig>,
    pub key_confirmation_expected_output: Option<Vec<u8>>,
    pub authentication_verified_output: Vec<u8>,
}

impl PayloadItem {
    /// A clone with `internal_length` and `authentication_verified_output`
    /// blanked, for feeding to the item's own MAC. Both write (computing
    /// the tag) and read (verifying it) build `config_bytes` from this
    /// same blanked clone, since neither field is known until the MAC
    /// itself has already been produced or checked.
    pub fn authenticatable_clone_blanked(&self) -> Self {
        let mut clone = self.clone();
        clone.internal_length = 0;
        clone.authentication_verified_output = Vec::new();
        clone
    }

    pub fn validate_path(&self) -> Result<(), PackageError> {
        crate::path::validate_relative_path(&self.relative_path, !self.kind.is_filesystem())
    }
}

/// `PayloadConfig`. `prng_cfg` is the seed material the
/// multiplexer's PRNG is keyed from; by convention it is
/// derived from the manifest's stretched MAC key so writer and reader
/// agree without an extra field in the wire format, but an explicit seed
/// may be carried here instead (e.g. for deterministic KATs).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayloadConfig {
    pub scheme: PayloadScheme,
    pub prng_seed: Vec<u8>,
    pub offset: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaddingRange {
    pub min: u32,
    pub max: u32,
}

impl PaddingRange {
    pub fn fixed(len: u32) -> Self {
        Self { min: len, max: len }
    }

    pub fn validate(&self, lo: u32, hi: u32) -> Result<(), PackageError> {
        if self.min > self.max {
            return Err(PackageError::Config("padding range min > max".into()));
        }
        if self.min < lo || self.max > hi {
            return Err(PackageError::Config(format!(
                "padding range [{}, {}] out of bounds [{}, {}]",
                self.min, self.max, lo, hi
            )));
        }
        Ok(())
    }
}

/// `PayloadConfig.scheme`: Simple, Frameshift, Fabric.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum PayloadScheme {
    Simple,
    Frameshift { padding: PaddingRange },
    Fabric { stripe: PaddingRange },
}

impl PayloadScheme {
    pub fn validate(&self) -> Result<(), PackageError> {
        match self {
            Self::Simple => Ok(()),
            Self::Frameshift { padding } => padding.validate(8, 512),
            Self::Fabric { stripe } => stripe.validate(8, 32768),
        }
    }
}

/// `Manifest`: the plaintext structure encrypted under the manifest
/// cipher, never exposed outside the writer/reader.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub payload_items: Vec<PayloadItem>,
    pub payload_cfg: PayloadConfig,
}

impl Manifest {
    pub fn validate(&self) -> Result<(), PackageError> {
        self.payload_cfg.scheme.validate()?;
        let mut seen = std::collections::HashSet::new();
        for item in &self.payload_items {
            if !seen.insert(item.identifier) {
                return Err(PackageError::Config(format!(
                    "duplicate item identifier {}",
                    item.identifier
                )));
            }
            item.validate_path()?;
        }
        if self.payload_items.is_empty() {
            return Err(PackageError::Config("manifest has no items".into()));
        }
        Ok(())
    }
}

/// `ManifestCryptoConfig`: one of two key-establishment schemes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ManifestCryptoConfig {
    Symmetric {
        cipher_cfg: CipherConfig,
        authentication_cfg: AuthenticationConfig,
        kdf_cfg: KeyDerivationConfig,
        key_confirmation_cfg: KeyConfirmationConfig,
        key_confirmation_expected_output: Vec<u8>,
        authentication_verified_output: Vec<u8>,
    },
    Um1Hybrid {
        cipher_cfg: CipherConfig,
        authentication_cfg: AuthenticationConfig,
        kdf_cfg: KeyDerivationConfig,
        key_confirmation_cfg: KeyConfirmationConfig,
        key_confirmation_expected_output: Vec<u8>,
        authentication_verified_output: Vec<u8>,
        ephemeral_public_key: Vec<u8>,
    },
}

impl ManifestCryptoConfig {
    pub fn cipher_cfg(&self) -> &CipherConfig {
        match self {
            Self::Symmetric { cipher_cfg, .. } | Self::Um1Hybrid { cipher_cfg, .. } => cipher_cfg,
        }
    }

    pub fn authentication_cfg(&self) -> &AuthenticationConfig {
        match self {
            Self::Symmetric { authentication_cfg, .. } | Self::Um1Hybrid { authentication_cfg, .. } => {
                authentication_cfg
            }
        }
    }

    pub fn kdf_cfg(&self) -> &KeyDerivationConfig {
        match self {
            Self::Symmetric { kdf_cfg, .. } | Self::Um1Hybrid { kdf_cfg, .. } => kdf_cfg,
        }
    }

    pub fn key_confirmation_cfg(&self) -> &KeyConfirmationConfig {
        match self {
            Self::Symmetric { key_confirmation_cfg, .. }
            | Self::Um1Hybrid { key_confirmation_cfg, .. } => key_confirmation_cfg,
        }
    }

    pub fn key_confirmation_expected_output(&self) -> &[u8] {
        match self {
            Self::Symmetric { key_confirmation_expected_output, .. }
            | Self::Um1Hybrid { key_confirmation_expected_output, .. } => {
                key_confirmation_expected_output
            }
        }
    }

    pub fn authentication_verified_output(&self) -> &[u8] {
        match self {
            Self::Symmetric { authentication_verified_output, .. }
            | Self::Um1Hybrid { authentication_verified_output, .. } => authentication_verified_output,
        }
    }

    /// A clone with `authentication_verified_output` blanked, for the MAC's
    /// "serialised authenticatable form of the enclosing config" input.
    pub fn authenticatable_clone(&self) -> Self {
        match self.clone() {
            Self::Symmetric { mut authentication_verified_output, cipher_cfg, authentication_cfg, kdf_cfg, key_confirmation_cfg, key_confirmation_expected_output, } => {
                authentication_verified_output.clear();
                Self::Symmetric {
                    cipher_cfg,
                    authentication_cfg,
                    kdf_cfg,
                    key_confirmation_cfg,
                    key_confirmation_expected_output,
                    authentication_verified_output,
                }
            }
            Self::Um1Hybrid { mut authentication_verified_output, cipher_cfg, authentication_cfg, kdf_cfg, key_confirmation_cfg, key_confirmation_expected_output, ephemeral_public_key, } => {
                authentication_verified_output.clear();
                Self::Um1Hybrid {
                    cipher_cfg,
                    authentication_cfg,
                    kdf_cfg,
                    key_confirmation_cfg,
                    key_confirmation_expected_output,
                    authentication_verified_output,
                    ephemeral_public_key,
                }
            }
        }
    }

    pub fn with_authentication_verified_output(mut self, tag: Vec<u8>) -> Self {
        match &mut self {
            Self::Symmetric { authentication_verified_output, .. }
            | Self::Um1Hybrid { authentication_verified_output, .. } => {
                *authentication_verified_output = tag;
            }
        }
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SchemeKind {
    Symmetric,
    Um1Hybrid,
}

/// `ManifestHeader`: `{ format_version, scheme, scheme_config }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManifestHeader {
    pub format_version: u32,
    pub scheme: SchemeKind,
    pub scheme_config: ManifestCryptoConfig,
}

impl ManifestHeader {
    pub fn scheme_kind(cfg: &ManifestCryptoConfig) -> SchemeKind {
        match cfg {
            ManifestCryptoConfig::Symmetric { .. } => SchemeKind::Symmetric,
            ManifestCryptoConfig::Um1Hybrid { .. } => SchemeKind::Um1Hybrid,
        }
    }
}

/// Candidate pre-keys the reader tries against the Symmetric scheme's key
/// confirmation tag.
#[derive(Default)]
pub struct SymmetricCandidates {
    pub pre_keys: Vec<zeroize::Zeroizing<Vec<u8>>>,
}

impl SymmetricCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pre_key: Vec<u8>) -> &mut Self {
        self.pre_keys.push(zeroize::Zeroizing::new(pre_key));
        self
    }
}

/// Candidate `(sender_pub, recipient_priv)` pairs the reader tries against
/// the UM1Hybrid scheme.
#[derive(Default)]
pub struct Um1Candidates {
    pub sender_public_keys: Vec<crate::um1::PublicKey>,
    pub recipient_secret_keys: Vec<crate::um1::SecretKey>,
}

impl Um1Candidates {
    pub fn new() -> Self {
        Self::default()
    }
}
