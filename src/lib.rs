//! # OCpkg
//!
//! A secure archival container format: one producer bundles named byte
//! payloads ("items") into a single authenticated stream. The manifest
//! describing those items is itself encrypted and authenticated under a
//! key derived from either a shared secret or a UM1 hybrid ECC key
//! agreement; each item's ciphertext is interleaved with the others under
//! a deterministic schedule and individually protected with Encrypt-then-MAC.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use std::io::Cursor;
//!
//! use ocpkg::config::{AuthenticationConfig, CipherConfig, KeyDerivationConfig, KeyConfirmationConfig, MacName, Pbkdf2InnerHash, Pbkdf2Params, StreamCipherName};
//! use ocpkg::entropy::OsEntropy;
//! use ocpkg::types::{ItemKind, PayloadConfig, PayloadItem, PayloadScheme};
//! use ocpkg::writer::{ContainerWriter, ManifestCryptoParams, ManifestKeyEstablishment};
//!
//! let item = PayloadItem {
//!     identifier: uuid::Uuid::new_v4(),
//!     kind: ItemKind::File,
//!     relative_path: "hello.txt".into(),
//!     external_length: 5,
//!     internal_length: 0,
//!     cipher_cfg: CipherConfig::new_stream(StreamCipherName::ChaCha20, vec![0x01; 12]).unwrap(),
//!     authentication_cfg: AuthenticationConfig::Mac { name: MacName::HmacSha256 },
//!     cipher_key: Some(vec![0x11; 32]),
//!     authentication_key: Some(vec![0x22; 32]),
//!     kdf_cfg: None,
//!     key_confirmation_cfg: None,
//!     key_confirmation_expected_output: None,
//!     authentication_verified_output: Vec::new(),
//! };
//!
//! let crypto = ManifestCryptoParams {
//!     cipher_cfg: CipherConfig::new_stream(StreamCipherName::ChaCha20, vec![0x02; 12]).unwrap(),
//!     authentication_cfg: AuthenticationConfig::Mac { name: MacName::HmacSha256 },
//!     kdf_cfg: KeyDerivationConfig::Pbkdf2 {
//!         salt: vec![0x03; 16],
//!         params: Pbkdf2Params { iterations: 10_000, inner_hash: Pbkdf2InnerHash::Sha256 },
//!     },
//!     key_confirmation_cfg: KeyConfirmationConfig::default(),
//!     key_establishment: ManifestKeyEstablishment::Symmetric {
//!         pre_key: zeroize::Zeroizing::new(b"a shared passphrase".to_vec()),
//!     },
//! };
//!
//! let payload_cfg = PayloadConfig { scheme: PayloadScheme::Simple, prng_seed: Vec::new(), offset: 0 };
//! let mut sources: HashMap<uuid::Uuid, Box<dyn std::io::Read + Send>> = HashMap::new();
//! sources.insert(item.identifier, Box::new(Cursor::new(b"hello".to_vec())));
//!
//! let writer = ContainerWriter::new(vec![item], payload_cfg, crypto, HashMap::new(), sources);
//! let mut out = Cursor::new(Vec::new());
//! writer.write(&mut out, &mut OsEntropy).unwrap();
//! ```
//!
//! ## Security Properties
//!
//! - **Encrypt-then-MAC** everywhere: the manifest and every item are MAC'd
//!   over their ciphertext, never the reverse.
//! - **Key confirmation**: the reader proves which candidate pre-key (or
//!   UM1-derived secret) is correct before trusting anything it decrypts.
//! - **Deterministic multiplexing**: writer and reader derive the same
//!   interleaving schedule from the same seed, so wire bytes are
//!   reproducible bit-for-bit given the same inputs.
//!
//! ## What's NOT Provided
//!
//! - Compression
//! - Key management/storage
//! - Streaming writers that don't know their manifest ahead of time
//! - Forward secrecy across multiple packages sharing one static key

#![deny(unsafe_code)]

pub mod config;
pub mod entropy;
pub mod error;
pub mod kdf;
pub mod keyconfirm;
pub mod manifest;
pub mod path;
pub mod prng;
pub mod primitives;
pub mod reader;
pub mod types;
pub mod um1;
pub mod wire;
pub mod writer;

#[doc(hidden)]
pub mod etm;
#[doc(hidden)]
pub mod mux;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::PackageError;
pub use reader::{read, Candidates};
pub use writer::{ContainerWriter, ManifestCryptoParams, ManifestKeyEstablishment};
