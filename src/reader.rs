//! Container reader.
//!
//! Mirrors `ContainerWriter`'s six steps: verify the header tag, parse the
//! manifest header, pick the correct pre-key by key confirmation, decrypt
//! and verify the manifest, run the multiplexer in read mode, and check
//! the trailer tag (non-fatal if missing).

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom, Write};

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::PackageError;
use crate::kdf;
use crate::keyconfirm;
use crate::manifest;
use crate::mux::Multiplexer;
use crate::types::{Manifest, ManifestCryptoConfig, ManifestHeader, SymmetricCandidates, Um1Candidates};
use crate::um1;
use crate::wire;

/// Candidate key material the reader is willing to try against the
/// manifest's key confirmation tag.
#[derive(Default)]
pub struct Candidates {
    pub symmetric: SymmetricCandidates,
    pub um1: Um1Candidates,
}

impl Candidates {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Resolves the manifest pre-key (or UM1 combined secret) that confirms
/// against `header`'s stored tag, trying every candidate the caller
/// supplied.
fn resolve_manifest_pre_key(
    header: &ManifestHeader,
    candidates: &Candidates,
) -> Result<Zeroizing<Vec<u8>>, PackageError> {
    match &header.scheme_config {
        ManifestCryptoConfig::Symmetric { key_confirmation_cfg, key_confirmation_expected_output, .. } => {
            let candidate_bytes: Vec<Vec<u8>> =
                candidates.symmetric.pre_keys.iter().map(|z| z.to_vec()).collect();
            keyconfirm::find_match(key_confirmation_cfg, &candidate_bytes, key_confirmation_expected_output)
                .map(|bytes| Zeroizing::new(bytes.clone()))
                .ok_or(PackageError::KeyConfirmation)
        }
        ManifestCryptoConfig::Um1Hybrid {
            key_confirmation_cfg,
            key_confirmation_expected_output,
            ephemeral_public_key,
            ..
        } => {
            let ephemeral = um1::PublicKey::from_bytes(ephemeral_public_key)?;
            let mut secrets: Vec<Vec<u8>> = Vec::new();
            for sender_public in &candidates.um1.sender_public_keys {
                for recipient_secret in &candidates.um1.recipient_secret_keys {
                    secrets.push(um1::reader_agree(recipient_secret, sender_public, &ephemeral).to_vec());
                }
            }
            keyconfirm::find_match(key_confirmation_cfg, &secrets, key_confirmation_expected_output)
                .map(|bytes| Zeroizing::new(bytes.clone()))
                .ok_or(PackageError::KeyConfirmation)
        }
    }
}

/// Parses the header and decrypts the manifest, leaving `source` positioned
/// right after the manifest ciphertext (before any offset padding).
fn resolve_manifest<R: Read + Seek>(
    source: &mut R,
    candidates: &Candidates,
) -> Result<Manifest, PackageError> {
    let mut header_tag = [0u8; 8];
    source.read_exact(&mut header_tag)?;
    if header_tag != wire::HEADER_TAG {
        return Err(PackageError::Format("header tag mismatch".into()));
    }
    tracing::debug!("reader: header tag verified");

    let header_bytes = wire::read_length_prefixed(source)?;
    let header: ManifestHeader = wire::decode(&header_bytes)?;
    if header.format_version > wire::FORMAT_VERSION {
        return Err(PackageError::Format(format!(
            "unsupported format_version {}",
            header.format_version
        )));
    }

    let pre_key = resolve_manifest_pre_key(&header, candidates).map_err(|e| {
        tracing::warn!("reader: no candidate key confirmed against the manifest tag");
        e
    })?;
    tracing::debug!("reader: manifest pre-key confirmed");

    let crypto_cfg = header.scheme_config;
    let cipher_key_len = crypto_cfg.cipher_cfg().key_size_bytes();
    let mac_key_len = crypto_cfg.authentication_cfg().mac_key_size_bytes();
    let stretched = kdf::stretch(&pre_key, cipher_key_len, mac_key_len, crypto_cfg.kdf_cfg())?;

    let mut obfuscated_len = [0u8; 4];
    source.read_exact(&mut obfuscated_len)?;
    let manifest_ct_len = manifest::deobfuscate_length_prefix(obfuscated_len, &stretched.mac_key);
    let mut manifest_ciphertext = vec![0u8; manifest_ct_len as usize];
    source.read_exact(&mut manifest_ciphertext)?;

    let manifest = manifest::decrypt(&manifest_ciphertext, &crypto_cfg, &stretched.cipher_key, &stretched.mac_key)
        .map_err(|e| {
            tracing::warn!("reader: manifest decrypt/verify failed");
            e
        })?;
    tracing::debug!(item_count = manifest.payload_items.len(), "reader: manifest decrypted and verified");

    Ok(manifest)
}

/// Decrypts and returns just the manifest, without running the payload
/// multiplexer — the `ocpkg inspect`/`ocpkg unpack` CLI's first pass, used
/// to discover item identifiers and relative paths before binding sinks.
/// Restores `source` to its starting position so a subsequent `read` call
/// can reparse the container from scratch.
pub fn peek_manifest<R: Read + Seek>(
    source: &mut R,
    candidates: &Candidates,
) -> Result<Manifest, PackageError> {
    let start = source.stream_position()?;
    let manifest = resolve_manifest(source, candidates)?;
    source.seek(SeekFrom::Start(start))?;
    Ok(manifest)
}

/// Reads a complete package from `source`, verifying it end to end and
/// delivering each item's plaintext to its bound sink. Returns the
/// decrypted `Manifest` (useful for callers that want item metadata
/// without re-parsing the container).
pub fn read<R: Read + Seek>(
    source: &mut R,
    candidates: &Candidates,
    item_pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
    sinks: HashMap<Uuid, Box<dyn Write + Send>>,
) -> Result<Manifest, PackageError> {
    let manifest = resolve_manifest(source, candidates)?;

    if manifest.payload_cfg.offset > 0 {
        source.seek(SeekFrom::Current(manifest.payload_cfg.offset as i64))?;
    }

    let mut mux = Multiplexer::new(
        manifest.payload_items.clone(),
        manifest.payload_cfg.scheme,
        &manifest.payload_cfg.prng_seed,
    );
    tracing::debug!("reader: payload multiplexing started");
    mux.run_read(source, sinks, item_pre_keys)?;
    tracing::debug!("reader: payload multiplexing finished, all items closed");

    let mut trailer_tag = [0u8; 8];
    match source.read_exact(&mut trailer_tag) {
        Ok(()) if trailer_tag == wire::TRAILER_TAG => tracing::debug!("reader: trailer tag verified"),
        Ok(()) => tracing::warn!("reader: trailer tag present but did not match (non-fatal)"),
        Err(_) => tracing::warn!("reader: trailer tag missing (non-fatal, payload already verified)"),
    }

    Ok(manifest)
}
