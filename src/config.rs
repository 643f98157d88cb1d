//! Configuration value types for ciphers, MAC/digest functions, and KDFs.
//!
//! Collapses the "deep inheritance of configuration wrappers" (Design Note
//! §9) into flat value-type enums. Every constructor validates and returns
//! `ConfigError` rather than panicking, per the same note.

use serde::{Deserialize, Serialize};

use crate::error::PackageError;

fn config_err(msg: impl Into<String>) -> PackageError {
    PackageError::Config(msg.into())
}

// ---------------------------------------------------------------------------
// Cipher configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockCipherName {
    Aes128,
    Aes192,
    Aes256,
}

impl BlockCipherName {
    pub fn key_bits(&self) -> u32 {
        match self {
            Self::Aes128 => 128,
            Self::Aes192 => 192,
            Self::Aes256 => 256,
        }
    }

    pub fn block_bits(&self) -> u32 {
        128
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamCipherName {
    XSalsa20,
    ChaCha20,
}

impl StreamCipherName {
    pub fn key_bits(&self) -> u32 {
        256
    }

    /// Nonce length in bytes.
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::XSalsa20 => 24,
            Self::ChaCha20 => 12,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaddingName {
    None,
    Pkcs7,
}

/// `CipherConfig`: `{ kind: Block|Stream, name, key_size_bits, iv_or_nonce,
/// (mode_name, padding_name, block_size_bits for Block) }`.
///
/// `mode_name` is fixed to CBC for the Block kind — the only chained mode
/// this crate implements.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CipherConfig {
    Block {
        name: BlockCipherName,
        key_size_bits: u32,
        iv: Vec<u8>,
        padding: PaddingName,
    },
    Stream {
        name: StreamCipherName,
        key_size_bits: u32,
        nonce: Vec<u8>,
    },
}

impl CipherConfig {
    pub fn new_block(
        name: BlockCipherName,
        iv: Vec<u8>,
        padding: PaddingName,
    ) -> Result<Self, PackageError> {
        if iv.len() != 16 {
            return Err(config_err("block cipher IV must be 16 bytes (CBC)"));
        }
        if padding == PaddingName::None {
            return Err(config_err(
                "block cipher mode requires padding; PaddingRequirement=Always",
            ));
        }
        Ok(Self::Block {
            name,
            key_size_bits: name.key_bits(),
            iv,
            padding,
        })
    }

    pub fn new_stream(name: StreamCipherName, nonce: Vec<u8>) -> Result<Self, PackageError> {
        if nonce.len() != name.nonce_len() {
            return Err(config_err(format!(
                "{:?} requires a {}-byte nonce, got {}",
                name,
                name.nonce_len(),
                nonce.len()
            )));
        }
        Ok(Self::Stream {
            name,
            key_size_bits: name.key_bits(),
            nonce,
        })
    }

    pub fn key_size_bytes(&self) -> usize {
        let bits = match self {
            Self::Block { key_size_bits, .. } => *key_size_bits,
            Self::Stream { key_size_bits, .. } => *key_size_bits,
        };
        (bits / 8) as usize
    }

    pub fn validate(&self) -> Result<(), PackageError> {
        match self {
            Self::Block { name, iv, padding, .. } => {
                if iv.len() != 16 {
                    return Err(config_err("block cipher IV must be 16 bytes"));
                }
                if *padding == PaddingName::None {
                    return Err(config_err("block mode requires padding"));
                }
                let _ = name.block_bits();
                Ok(())
            }
            Self::Stream { name, nonce, .. } => {
                if nonce.len() != name.nonce_len() {
                    return Err(config_err("stream cipher nonce length mismatch"));
                }
                Ok(())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DigestName {
    Keccak256,
    Keccak512,
    Sha256,
    Sha512,
}

impl DigestName {
    pub fn output_bytes(&self) -> usize {
        match self {
            Self::Keccak256 | Self::Sha256 => 32,
            Self::Keccak512 | Self::Sha512 => 64,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacName {
    HmacKeccak256,
    HmacKeccak512,
    HmacSha256,
    Poly1305,
}

impl MacName {
    pub fn key_size_bytes(&self) -> usize {
        match self {
            Self::HmacKeccak256 => 32,
            Self::HmacKeccak512 => 64,
            Self::HmacSha256 => 32,
            Self::Poly1305 => 32,
        }
    }

    pub fn output_bytes(&self) -> usize {
        match self {
            Self::HmacKeccak256 => 32,
            Self::HmacKeccak512 => 64,
            Self::HmacSha256 => 32,
            Self::Poly1305 => 16,
        }
    }
}

/// `AuthenticationConfig`: `{ kind: Mac|Digest|Kdf, name, key_size_bits?,
/// nonce?, salt?, inner_function_cfg? }`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum AuthenticationConfig {
    Mac { name: MacName },
    Digest { name: DigestName, salt: Vec<u8>, nonce: Vec<u8> },
}

impl AuthenticationConfig {
    pub fn mac_key_size_bytes(&self) -> usize {
        match self {
            Self::Mac { name } => name.key_size_bytes(),
            Self::Digest { name, .. } => name.output_bytes(),
        }
    }

    pub fn output_bytes(&self) -> usize {
        match self {
            Self::Mac { name } => name.output_bytes(),
            Self::Digest { name, .. } => name.output_bytes(),
        }
    }
}

// ---------------------------------------------------------------------------
// Key derivation configuration
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScryptParams {
    /// `N = 2^iter_power`.
    pub iter_power: u8,
    pub r: u32,
    pub p: u32,
}

impl ScryptParams {
    /// Package defaults: low-entropy pre-keys (passphrases) get stronger
    /// parameters.
    pub fn default_for(low_entropy: bool) -> Self {
        if low_entropy {
            Self { iter_power: 16, r: 16, p: 2 }
        } else {
            Self { iter_power: 10, r: 8, p: 2 }
        }
    }

    pub fn validate(&self) -> Result<(), PackageError> {
        if !(5..=20).contains(&self.iter_power) {
            return Err(config_err("scrypt iter_power must be in [5, 20]"));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Pbkdf2InnerHash {
    Sha256,
    Sha512,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    pub iterations: u32,
    pub inner_hash: Pbkdf2InnerHash,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum KeyDerivationConfig {
    Scrypt { salt: Vec<u8>, params: ScryptParams },
    Pbkdf2 { salt: Vec<u8>, params: Pbkdf2Params },
}

impl KeyDerivationConfig {
    pub fn validate(&self) -> Result<(), PackageError> {
        match self {
            Self::Scrypt { salt, params } => {
                if salt.is_empty() {
                    return Err(config_err("scrypt salt must be non-empty"));
                }
                params.validate()
            }
            Self::Pbkdf2 { salt, params } => {
                if salt.is_empty() {
                    return Err(config_err("pbkdf2 salt must be non-empty"));
                }
                if params.iterations == 0 {
                    return Err(config_err("pbkdf2 iterations must be > 0"));
                }
                Ok(())
            }
        }
    }

    pub fn salt(&self) -> &[u8] {
        match self {
            Self::Scrypt { salt, .. } => salt,
            Self::Pbkdf2 { salt, .. } => salt,
        }
    }
}

/// A short tag configuration for key confirmation:
/// `expected_output(cfg, key) = H(cfg.salt || key || cfg.nonce)`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyConfirmationConfig {
    pub auth: AuthenticationConfig,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
}

impl Default for KeyConfirmationConfig {
    fn default() -> Self {
        Self {
            auth: AuthenticationConfig::Digest {
                name: DigestName::Keccak256,
                salt: Vec::new(),
                nonce: Vec::new(),
            },
            salt: Vec::new(),
            nonce: Vec::new(),
        }
    }
}
