//! Payload multiplexer: interleaves N item EtM pipelines
//! into/out of a single payload stream under a deterministic PRNG
//! schedule, in three layout variants (Simple, Frameshift, Fabric).
//!
//! Single-threaded and cooperative: one selection picks an
//! item, a bounded amount of data is processed for it, selection repeats.
//! The same `(payload_cfg, item_configs, item_sizes)` always produce the
//! same selection + length-draw sequence on writer and reader, which is
//! what makes the wire bytes reproducible bit-exactly.

use std::collections::HashMap;
use std::io::{self, Read, Write};

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::entropy::EntropySource;
use crate::error::PackageError;
use crate::etm::{Decryptor, Encryptor};
use crate::kdf;
use crate::prng::DeterministicPrng;
use crate::primitives::{new_cipher_stream, new_mac, Direction};
use crate::types::{PaddingRange, PayloadItem, PayloadScheme};
use crate::wire;

/// Per-item state machine: New → Streaming → Closed. The header/trailer
/// and authentication steps collapse into the transition edges here
/// rather than standing as their own states, since both are instantaneous
/// relative to a selection turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ItemState {
    New,
    Streaming,
    Closed,
}

struct ItemPipeline {
    state: ItemState,
    encryptor: Option<Encryptor>,
    decryptor: Option<Decryptor>,
    /// Fabric's per-item output buffer: pending ciphertext awaiting a
    /// stripe drain in write mode, or plaintext awaiting MAC verification
    /// in read mode. The two uses never overlap, since a pipeline is only
    /// ever driven in one direction.
    output_buffer: Vec<u8>,
    /// Ciphertext bytes consumed from the source so far, for Fabric read
    /// mode (bounded by `item.internal_length`).
    ciphertext_progress: u64,
    finalized: bool,
    result_internal_length: u64,
    result_tag: Vec<u8>,
}

impl ItemPipeline {
    fn new() -> Self {
        Self {
            state: ItemState::New,
            encryptor: None,
            decryptor: None,
            output_buffer: Vec::new(),
            ciphertext_progress: 0,
            finalized: false,
            result_internal_length: 0,
            result_tag: Vec::new(),
        }
    }
}

/// Resolves `(cipher_key, mac_key)` for an item: direct keys if the item
/// carries them, otherwise the item's own KDF over a registered pre-key.
fn resolve_item_keys(
    item: &PayloadItem,
    pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>), PackageError> {
    if let (Some(ck), Some(mk)) = (&item.cipher_key, &item.authentication_key) {
        return Ok((Zeroizing::new(ck.clone()), Zeroizing::new(mk.clone())));
    }
    let kdf_cfg = item.kdf_cfg.as_ref().ok_or_else(|| {
        PackageError::KeyMissing(format!("item {} has neither direct keys nor a kdf_cfg", item.identifier))
    })?;
    let pre_key = pre_keys.get(&item.identifier).ok_or_else(|| {
        PackageError::KeyMissing(format!("item {} has no registered pre-key", item.identifier))
    })?;
    let stretched = kdf::stretch(
        pre_key,
        item.cipher_cfg.key_size_bytes(),
        item.authentication_cfg.mac_key_size_bytes(),
        kdf_cfg,
    )?;
    Ok((stretched.cipher_key, stretched.mac_key))
}

fn read_exact_mapped(source: &mut dyn Read, buf: &mut [u8]) -> Result<(), PackageError> {
    source.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => PackageError::PayloadLength("unexpected end of payload stream".into()),
        _ => PackageError::Io(e.to_string()),
    })
}

fn io_err(e: io::Error) -> PackageError {
    PackageError::Io(e.to_string())
}

/// Maximum plaintext read per Fabric fill step, bounding the per-item
/// spill buffer to roughly `max_stripe + cipher_operation_size`.
const FABRIC_READ_CHUNK: usize = 4096;

pub struct Multiplexer {
    items: Vec<PayloadItem>,
    scheme: PayloadScheme,
    prng: DeterministicPrng,
    pipelines: Vec<ItemPipeline>,
}

impl Multiplexer {
    pub fn new(items: Vec<PayloadItem>, scheme: PayloadScheme, prng_seed: &[u8]) -> Self {
        let pipelines = items.iter().map(|_| ItemPipeline::new()).collect();
        Self { items, scheme, prng: DeterministicPrng::new(prng_seed), pipelines }
    }

    fn all_closed(&self) -> bool {
        self.pipelines.iter().all(|p| p.state == ItemState::Closed)
    }

    /// Uniform selection in `[0, N)`, skipping items already `Closed`.
    fn select_active_index(&mut self) -> usize {
        loop {
            let idx = self.prng.next_below(self.items.len() as u32) as usize;
            if self.pipelines[idx].state != ItemState::Closed {
                return idx;
            }
        }
    }

    fn draw_length(&mut self, range: PaddingRange) -> u32 {
        if range.min == range.max {
            range.min
        } else {
            self.prng.next_in_range(range.min, range.max + 1)
        }
    }

    // -----------------------------------------------------------------
    // Write mode
    // -----------------------------------------------------------------

    /// Runs the multiplexer to completion in write mode, pulling
    /// plaintext from `sources` (keyed by item identifier) and writing
    /// ciphertext (and, for Frameshift, padding) to `sink`.
    ///
    /// Returns `(internal_length, authentication_verified_output)` per
    /// item, in manifest order, for the writer to embed back into the
    /// manifest before the rewrite pass.
    pub fn run_write<W: Write>(
        &mut self,
        sink: &mut W,
        mut sources: HashMap<Uuid, Box<dyn Read + Send>>,
        pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
        entropy: &mut dyn EntropySource,
    ) -> Result<Vec<(u64, Vec<u8>)>, PackageError> {
        let mut bindings: Vec<Box<dyn Read + Send>> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let src = sources.remove(&item.identifier).ok_or_else(|| {
                PackageError::StreamBindingMissing(format!("item {} has no source bound", item.identifier))
            })?;
            bindings.push(src);
        }

        while !self.all_closed() {
            let idx = self.select_active_index();
            self.ensure_write_pipeline(idx, pre_keys)?;
            self.write_turn(idx, sink, bindings[idx].as_mut(), entropy)?;
        }

        Ok(self.pipelines.iter().map(|p| (p.result_internal_length, p.result_tag.clone())).collect())
    }

    fn ensure_write_pipeline(
        &mut self,
        idx: usize,
        pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
    ) -> Result<(), PackageError> {
        if self.pipelines[idx].encryptor.is_some() || self.pipelines[idx].finalized {
            return Ok(());
        }
        let item = &self.items[idx];
        let (cipher_key, mac_key) = resolve_item_keys(item, pre_keys)?;
        let cipher = new_cipher_stream(&item.cipher_cfg, &cipher_key, Direction::Encrypt)?;
        let mac = new_mac(&item.authentication_cfg, &mac_key)?;
        self.pipelines[idx].encryptor = Some(Encryptor::new(cipher, mac));
        self.pipelines[idx].state = ItemState::Streaming;
        Ok(())
    }

    fn write_turn<W: Write>(
        &mut self,
        idx: usize,
        sink: &mut W,
        source: &mut dyn Read,
        entropy: &mut dyn EntropySource,
    ) -> Result<(), PackageError> {
        match self.scheme {
            PayloadScheme::Simple => self.write_whole_item(idx, sink, source, None, entropy),
            PayloadScheme::Frameshift { padding } => {
                self.write_whole_item(idx, sink, source, Some(padding), entropy)
            }
            PayloadScheme::Fabric { stripe } => {
                let stripe_len = self.draw_length(stripe);
                self.write_fabric_stripe(idx, sink, source, stripe_len)
            }
        }
    }

    /// Simple and Frameshift share this one-shot-per-item pass: header
    /// padding (if any), the whole item content, trailer padding (if
    /// any), then finalize.
    fn write_whole_item<W: Write>(
        &mut self,
        idx: usize,
        sink: &mut W,
        source: &mut dyn Read,
        padding: Option<PaddingRange>,
        entropy: &mut dyn EntropySource,
    ) -> Result<(), PackageError> {
        let header_len = padding.map(|p| self.draw_length(p));
        let trailer_len = padding.map(|p| self.draw_length(p));

        let item = self.items[idx].clone();
        let pipeline = &mut self.pipelines[idx];
        let encryptor = pipeline.encryptor.as_mut().expect("pipeline built by ensure_write_pipeline");

        let header_bytes = match header_len {
            Some(len) => entropy.bytes(len as usize),
            None => Vec::new(),
        };
        if !header_bytes.is_empty() {
            sink.write_all(&header_bytes).map_err(io_err)?;
            encryptor.authenticate_extra(&header_bytes);
        }

        let external_len = item.external_length;
        let mut plaintext = Vec::with_capacity(external_len as usize);
        source.take(external_len).read_to_end(&mut plaintext).map_err(io_err)?;
        if plaintext.len() as u64 != external_len {
            return Err(PackageError::PayloadLength(format!(
                "item {} declared external_length {} but source yielded {}",
                item.identifier,
                external_len,
                plaintext.len()
            )));
        }

        let ciphertext = encryptor.write(&plaintext);
        sink.write_all(&ciphertext).map_err(io_err)?;

        let trailer_bytes = match trailer_len {
            Some(len) => entropy.bytes(len as usize),
            None => Vec::new(),
        };

        let config_bytes = wire::encode(&item.authenticatable_clone_blanked())?;
        let pre_finalize_bytes_out = encryptor.bytes_out();
        let encryptor = pipeline.encryptor.take().unwrap();
        let (tail, tag) = encryptor.finalize(&trailer_bytes, &config_bytes)?;
        sink.write_all(&tail).map_err(io_err)?;
        if !trailer_bytes.is_empty() {
            sink.write_all(&trailer_bytes).map_err(io_err)?;
        }

        pipeline.result_internal_length = pre_finalize_bytes_out + tail.len() as u64;
        pipeline.result_tag = tag;
        pipeline.finalized = true;
        pipeline.state = ItemState::Closed;
        Ok(())
    }

    fn write_fabric_stripe<W: Write>(
        &mut self,
        idx: usize,
        sink: &mut W,
        source: &mut dyn Read,
        stripe_len: u32,
    ) -> Result<(), PackageError> {
        let item = self.items[idx].clone();
        let pipeline = &mut self.pipelines[idx];
        let target = stripe_len as usize;

        while pipeline.output_buffer.len() < target && !pipeline.finalized {
            let bytes_in = pipeline.encryptor.as_ref().unwrap().bytes_in();
            let remaining = item.external_length - bytes_in;
            if remaining == 0 {
                let config_bytes = wire::encode(&item.authenticatable_clone_blanked())?;
                let pre_finalize_bytes_out = pipeline.encryptor.as_ref().unwrap().bytes_out();
                let encryptor = pipeline.encryptor.take().unwrap();
                let (tail, tag) = encryptor.finalize(b"", &config_bytes)?;
                pipeline.output_buffer.extend(tail.iter());
                pipeline.result_internal_length = pre_finalize_bytes_out + tail.len() as u64;
                pipeline.result_tag = tag;
                pipeline.finalized = true;
                break;
            }
            let needed = target.saturating_sub(pipeline.output_buffer.len()) as u64;
            let chunk_len = remaining.min(needed.max(1)).min(FABRIC_READ_CHUNK as u64) as usize;
            let mut chunk = vec![0u8; chunk_len];
            read_exact_mapped(source, &mut chunk)?;
            let ct = pipeline.encryptor.as_mut().unwrap().write(&chunk);
            pipeline.output_buffer.extend(ct);
        }

        let drain_len = target.min(pipeline.output_buffer.len());
        let drained: Vec<u8> = pipeline.output_buffer.drain(..drain_len).collect();
        sink.write_all(&drained).map_err(io_err)?;

        pipeline.state = if pipeline.finalized && pipeline.output_buffer.is_empty() {
            ItemState::Closed
        } else {
            ItemState::Streaming
        };
        Ok(())
    }

    // -----------------------------------------------------------------
    // Read mode
    // -----------------------------------------------------------------

    /// Runs the multiplexer to completion in read mode, pulling
    /// ciphertext (and, for Frameshift, padding) from `source` and
    /// writing verified plaintext to `sinks` (keyed by item identifier).
    pub fn run_read<R: Read>(
        &mut self,
        source: &mut R,
        mut sinks: HashMap<Uuid, Box<dyn Write + Send>>,
        pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
    ) -> Result<(), PackageError> {
        let mut bindings: Vec<Box<dyn Write + Send>> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let sink = sinks.remove(&item.identifier).ok_or_else(|| {
                PackageError::StreamBindingMissing(format!("item {} has no sink bound", item.identifier))
            })?;
            bindings.push(sink);
        }

        for idx in 0..self.items.len() {
            self.ensure_read_pipeline(idx, pre_keys)?;
        }

        while !self.all_closed() {
            let idx = self.select_active_index();
            self.read_turn(idx, source, bindings[idx].as_mut())?;
        }
        Ok(())
    }

    fn ensure_read_pipeline(
        &mut self,
        idx: usize,
        pre_keys: &HashMap<Uuid, Zeroizing<Vec<u8>>>,
    ) -> Result<(), PackageError> {
        if self.pipelines[idx].decryptor.is_some() || self.pipelines[idx].finalized {
            return Ok(());
        }
        let item = &self.items[idx];
        let (cipher_key, mac_key) = resolve_item_keys(item, pre_keys)?;
        let cipher = new_cipher_stream(&item.cipher_cfg, &cipher_key, Direction::Decrypt)?;
        let mac = new_mac(&item.authentication_cfg, &mac_key)?;
        self.pipelines[idx].decryptor = Some(Decryptor::new(cipher, mac));
        self.pipelines[idx].state = ItemState::Streaming;
        Ok(())
    }

    fn read_turn<R: Read>(&mut self, idx: usize, source: &mut R, sink: &mut dyn Write) -> Result<(), PackageError> {
        match self.scheme {
            PayloadScheme::Simple => self.read_whole_item(idx, source, sink, None),
            PayloadScheme::Frameshift { padding } => self.read_whole_item(idx, source, sink, Some(padding)),
            PayloadScheme::Fabric { stripe } => {
                let stripe_len = self.draw_length(stripe);
                self.read_fabric_stripe(idx, source, sink, stripe_len)
            }
        }
    }

    fn read_whole_item<R: Read>(
        &mut self,
        idx: usize,
        source: &mut R,
        sink: &mut dyn Write,
        padding: Option<PaddingRange>,
    ) -> Result<(), PackageError> {
        let header_len = padding.map(|p| self.draw_length(p));
        let item = self.items[idx].clone();
        let pipeline = &mut self.pipelines[idx];

        let mut header_bytes = vec![0u8; header_len.unwrap_or(0) as usize];
        if !header_bytes.is_empty() {
            read_exact_mapped(source, &mut header_bytes)?;
        }

        let mut ciphertext = vec![0u8; item.internal_length as usize];
        read_exact_mapped(source, &mut ciphertext)?;

        let decryptor = pipeline.decryptor.as_mut().unwrap();
        if !header_bytes.is_empty() {
            decryptor.authenticate_extra(&header_bytes);
        }
        let plaintext_head = decryptor.read(&ciphertext);

        let trailer_len = padding.map(|p| self.draw_length(p));
        let mut trailer_bytes = vec![0u8; trailer_len.unwrap_or(0) as usize];
        if !trailer_bytes.is_empty() {
            read_exact_mapped(source, &mut trailer_bytes)?;
        }

        let pipeline = &mut self.pipelines[idx];
        let decryptor = pipeline.decryptor.take().unwrap();
        let expected = item.authentication_verified_output.clone();
        let config_bytes = wire::encode(&item.authenticatable_clone_blanked())?;
        let plaintext_tail = decryptor.finalize(&trailer_bytes, &config_bytes, &expected)?;

        sink.write_all(&plaintext_head).map_err(io_err)?;
        sink.write_all(&plaintext_tail).map_err(io_err)?;

        let total_plaintext = (plaintext_head.len() + plaintext_tail.len()) as u64;
        if total_plaintext != item.external_length {
            return Err(PackageError::PayloadLength(format!(
                "item {} declared external_length {} but decrypted {}",
                item.identifier, item.external_length, total_plaintext
            )));
        }

        pipeline.finalized = true;
        pipeline.state = ItemState::Closed;
        Ok(())
    }

    /// Buffers each stripe's plaintext in `pipeline.output_buffer` rather
    /// than writing it straight to `sink`: the item's MAC only verifies on
    /// the final stripe, and nothing may reach the caller before that
    /// check passes.
    fn read_fabric_stripe<R: Read>(
        &mut self,
        idx: usize,
        source: &mut R,
        sink: &mut dyn Write,
        stripe_len: u32,
    ) -> Result<(), PackageError> {
        let item = self.items[idx].clone();
        let pipeline = &mut self.pipelines[idx];

        let remaining = item.internal_length - pipeline.ciphertext_progress;
        let take = (stripe_len as u64).min(remaining) as usize;
        if take > 0 {
            let mut chunk = vec![0u8; take];
            read_exact_mapped(source, &mut chunk)?;
            let pt = pipeline.decryptor.as_mut().unwrap().read(&chunk);
            pipeline.output_buffer.extend(pt);
            pipeline.ciphertext_progress += take as u64;
        }

        if pipeline.ciphertext_progress == item.internal_length {
            let decryptor = pipeline.decryptor.take().unwrap();
            let expected = item.authentication_verified_output.clone();
            let config_bytes = wire::encode(&item.authenticatable_clone_blanked())?;
            let tail = decryptor.finalize(b"", &config_bytes, &expected)?;
            let mut verified = std::mem::take(&mut pipeline.output_buffer);
            verified.extend(tail);
            sink.write_all(&verified).map_err(io_err)?;
            pipeline.finalized = true;
            pipeline.state = ItemState::Closed;
        } else {
            pipeline.state = ItemState::Streaming;
        }
        Ok(())
    }
}
