//! Container writer.
//!
//! Single-use: one `ContainerWriter` drives exactly one `write` call, then
//! the key material it held is dropped and zeroed. The call sequence
//! mirrors pre-flight validation, manifest
//! pre-key stretch, header tag, placeholder reservation, multiplexed
//! payload, manifest rewrite, trailer tag.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::config::{AuthenticationConfig, CipherConfig, KeyConfirmationConfig, KeyDerivationConfig};
use crate::entropy::EntropySource;
use crate::error::{ErrorAccumulator, PackageError};
use crate::kdf;
use crate::keyconfirm;
use crate::manifest;
use crate::mux::Multiplexer;
use crate::types::{Manifest, ManifestCryptoConfig, ManifestHeader, PayloadConfig, PayloadItem};
use crate::um1;
use crate::wire;

/// How the manifest pre-key (or UM1 combined secret) is established.
pub enum ManifestKeyEstablishment {
    Symmetric { pre_key: Zeroizing<Vec<u8>> },
    Um1Hybrid { sender_secret: um1::SecretKey, recipient_public: um1::PublicKey },
}

/// Everything the writer needs to know about the manifest's own crypto,
/// independent of the per-item configuration carried inside `Manifest`.
pub struct ManifestCryptoParams {
    pub cipher_cfg: CipherConfig,
    pub authentication_cfg: AuthenticationConfig,
    pub kdf_cfg: KeyDerivationConfig,
    pub key_confirmation_cfg: KeyConfirmationConfig,
    pub key_establishment: ManifestKeyEstablishment,
}

/// Drives the write side of a package: validates, stretches the manifest
/// key, reserves and later rewrites the manifest placeholder, and runs the
/// payload multiplexer in between.
pub struct ContainerWriter {
    items: Vec<PayloadItem>,
    payload_scheme: crate::types::PayloadScheme,
    payload_offset: u64,
    prng_seed: Vec<u8>,
    crypto: ManifestCryptoParams,
    item_pre_keys: HashMap<Uuid, Zeroizing<Vec<u8>>>,
    sources: HashMap<Uuid, Box<dyn Read + Send>>,
    used: bool,
}

impl ContainerWriter {
    pub fn new(
        items: Vec<PayloadItem>,
        payload_cfg: PayloadConfig,
        crypto: ManifestCryptoParams,
        item_pre_keys: HashMap<Uuid, Zeroizing<Vec<u8>>>,
        sources: HashMap<Uuid, Box<dyn Read + Send>>,
    ) -> Self {
        Self {
            items,
            payload_scheme: payload_cfg.scheme,
            payload_offset: payload_cfg.offset,
            prng_seed: payload_cfg.prng_seed,
            crypto,
            item_pre_keys,
            sources,
            used: false,
        }
    }

    /// Step 1: pre-flight validation. Aggregates every problem found.
    fn validate(&self) -> Result<(), PackageError> {
        let mut errors = ErrorAccumulator::new();

        if self.items.is_empty() {
            errors.push(PackageError::Config("package has no items".into()));
        }

        let mut seen = std::collections::HashSet::new();
        for item in &self.items {
            if !seen.insert(item.identifier) {
                errors.push(PackageError::Config(format!("duplicate item identifier {}", item.identifier)));
            }
            if let Err(e) = item.validate_path() {
                errors.push(e);
            }
            if let Err(e) = item.cipher_cfg.validate() {
                errors.push(e);
            }

            let has_direct_keys = item.cipher_key.is_some() && item.authentication_key.is_some();
            let has_kdf_pre_key = item.kdf_cfg.is_some() && self.item_pre_keys.contains_key(&item.identifier);
            if !has_direct_keys && !has_kdf_pre_key {
                errors.push(PackageError::KeyMissing(format!(
                    "item {} has neither direct keys nor a registered pre-key",
                    item.identifier
                )));
            }

            if !self.sources.contains_key(&item.identifier) {
                errors.push(PackageError::StreamBindingMissing(format!(
                    "item {} has no source bound",
                    item.identifier
                )));
            }
        }

        if let Err(e) = self.payload_scheme.validate() {
            errors.push(e);
        }

        errors.into_result()
    }

    /// Resolves the manifest pre-key (symmetric) or UM1 combined shared
    /// secret, alongside the `ManifestCryptoConfig` fields that are fixed
    /// up front (key confirmation tag, ephemeral public key for UM1).
    fn establish_manifest_key(
        &self,
        entropy: &mut dyn EntropySource,
    ) -> Result<(Zeroizing<Vec<u8>>, Option<[u8; um1::PUBLIC_KEY_BYTES]>), PackageError> {
        match &self.crypto.key_establishment {
            ManifestKeyEstablishment::Symmetric { pre_key } => Ok((pre_key.clone(), None)),
            ManifestKeyEstablishment::Um1Hybrid { sender_secret, recipient_public } => {
                let (secret, ephemeral_pub) = um1::writer_agree(sender_secret, recipient_public, entropy);
                Ok((secret, Some(ephemeral_pub)))
            }
        }
    }

    /// Builds the placeholder `ManifestCryptoConfig`: every field that is
    /// fixed before the payload runs (key confirmation tag, UM1 ephemeral
    /// key) carries its real value; `authentication_verified_output` (the
    /// manifest's own MAC tag, unknown until step 6) is a zero buffer of
    /// the correct length so the serialised size matches the eventual real
    /// header exactly.
    fn build_crypto_config(
        &self,
        key_confirmation_expected_output: Vec<u8>,
        ephemeral_public_key: Option<[u8; um1::PUBLIC_KEY_BYTES]>,
    ) -> ManifestCryptoConfig {
        let authentication_verified_output =
            manifest::zeroed_authentication_output(&self.crypto.authentication_cfg);
        match ephemeral_public_key {
            None => ManifestCryptoConfig::Symmetric {
                cipher_cfg: self.crypto.cipher_cfg.clone(),
                authentication_cfg: self.crypto.authentication_cfg.clone(),
                kdf_cfg: self.crypto.kdf_cfg.clone(),
                key_confirmation_cfg: self.crypto.key_confirmation_cfg.clone(),
                key_confirmation_expected_output,
                authentication_verified_output,
            },
            Some(ephemeral) => ManifestCryptoConfig::Um1Hybrid {
                cipher_cfg: self.crypto.cipher_cfg.clone(),
                authentication_cfg: self.crypto.authentication_cfg.clone(),
                kdf_cfg: self.crypto.kdf_cfg.clone(),
                key_confirmation_cfg: self.crypto.key_confirmation_cfg.clone(),
                key_confirmation_expected_output,
                authentication_verified_output,
                ephemeral_public_key: ephemeral.to_vec(),
            },
        }
    }

    /// Writes the complete package to `sink`. Consumes `self`: a writer
    /// may run at most once.
    pub fn write<W: Write + Seek>(
        mut self,
        sink: &mut W,
        entropy: &mut dyn EntropySource,
    ) -> Result<(), PackageError> {
        if self.used {
            return Err(PackageError::Config("writer already used".into()));
        }
        self.used = true;

        self.validate()?;
        tracing::debug!(item_count = self.items.len(), "writer: pre-flight validation passed");

        let (pre_key, ephemeral_public_key) = self.establish_manifest_key(entropy)?;
        let m_cipher_key_len = self.crypto.cipher_cfg.key_size_bytes();
        let m_mac_key_len = self.crypto.authentication_cfg.mac_key_size_bytes();
        let stretched = kdf::stretch(&pre_key, m_cipher_key_len, m_mac_key_len, &self.crypto.kdf_cfg)?;
        tracing::debug!("writer: manifest pre-key stretched");

        let key_confirmation_expected_output =
            keyconfirm::expected_output(&self.crypto.key_confirmation_cfg, &pre_key)?;
        let crypto_cfg = self.build_crypto_config(key_confirmation_expected_output, ephemeral_public_key);

        if self.prng_seed.is_empty() {
            self.prng_seed = stretched.mac_key.to_vec();
        }

        sink.write_all(&wire::HEADER_TAG)?;
        tracing::debug!("writer: header tag written");

        let placeholder_manifest = Manifest {
            payload_items: self.items.iter().map(placeholder_item).collect(),
            payload_cfg: PayloadConfig {
                scheme: self.payload_scheme,
                prng_seed: self.prng_seed.clone(),
                offset: self.payload_offset,
            },
        };
        let (placeholder_ciphertext, _) =
            manifest::encrypt(&placeholder_manifest, &crypto_cfg, &stretched.cipher_key, &stretched.mac_key)?;
        let placeholder_header = ManifestHeader {
            format_version: wire::FORMAT_VERSION,
            scheme: ManifestHeader::scheme_kind(&crypto_cfg),
            scheme_config: crypto_cfg.clone(),
        };
        let placeholder_header_bytes = wire::encode(&placeholder_header)?;
        let placeholder_length = 8 + placeholder_header_bytes.len() + 4 + placeholder_ciphertext.len();

        let manifest_region_start = sink.stream_position()?;
        sink.write_all(&vec![0u8; placeholder_length])?;
        tracing::debug!(placeholder_length, "writer: manifest placeholder reserved");

        if self.payload_offset > 0 {
            let padding = entropy.bytes(self.payload_offset as usize);
            sink.write_all(&padding)?;
        }

        let mut mux = Multiplexer::new(self.items.clone(), self.payload_scheme, &self.prng_seed);
        tracing::debug!("writer: payload multiplexing started");
        let results = mux.run_write(sink, self.sources, &self.item_pre_keys, entropy)?;
        for (item, (internal_length, tag)) in self.items.iter_mut().zip(results) {
            item.internal_length = internal_length;
            item.authentication_verified_output = tag;
        }
        tracing::debug!("writer: payload multiplexing finished");

        let final_manifest = Manifest {
            payload_items: self.items,
            payload_cfg: PayloadConfig {
                scheme: self.payload_scheme,
                prng_seed: self.prng_seed,
                offset: self.payload_offset,
            },
        };
        let (final_ciphertext, manifest_tag) =
            manifest::encrypt(&final_manifest, &crypto_cfg, &stretched.cipher_key, &stretched.mac_key)?;
        let final_crypto_cfg = crypto_cfg.with_authentication_verified_output(manifest_tag);
        let final_header = ManifestHeader {
            format_version: wire::FORMAT_VERSION,
            scheme: ManifestHeader::scheme_kind(&final_crypto_cfg),
            scheme_config: final_crypto_cfg,
        };
        let final_header_bytes = wire::encode(&final_header)?;
        let obfuscated_len = manifest::obfuscated_length_prefix(final_ciphertext.len() as u32, &stretched.mac_key);

        let final_region_length = 8 + final_header_bytes.len() + 4 + final_ciphertext.len();
        if final_region_length != placeholder_length {
            return Err(PackageError::Format(
                "computed manifest placeholder length does not match the final manifest region".into(),
            ));
        }

        let payload_end = sink.stream_position()?;
        sink.seek(SeekFrom::Start(manifest_region_start))?;
        wire::write_length_prefixed(sink, &final_header_bytes)?;
        sink.write_all(&obfuscated_len)?;
        sink.write_all(&final_ciphertext)?;
        tracing::debug!("writer: manifest rewritten with final authentication tags");

        sink.seek(SeekFrom::Start(payload_end))?;
        sink.write_all(&wire::TRAILER_TAG)?;
        tracing::debug!("writer: trailer tag written");

        Ok(())
    }
}

/// Clone of `item` with `internal_length` zeroed and `authentication_verified_output`
/// replaced by a zero buffer of the correct fixed length, for placeholder
/// sizing — distinct from `authenticatable_clone_blanked`,
/// which empties the field instead since it feeds the per-item MAC, not the
/// manifest's own serialised byte length.
fn placeholder_item(item: &PayloadItem) -> PayloadItem {
    let mut clone = item.clone();
    clone.internal_length = 0;
    clone.authentication_verified_output = vec![0u8; item.authentication_cfg.output_bytes()];
    clone
}
