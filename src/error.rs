//! Unified error type for the package writer/reader pipeline.
//!
//! Hand-written `Display` + `Error` impls, no `thiserror`.

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum PackageError {
    /// Header/trailer tag mismatch, unsupported version, or DTO decode failure.
    Format(String),
    /// Enumerated configuration value out of the allowed range.
    Config(String),
    /// An item lacks both direct keys and a registered pre-key.
    KeyMissing(String),
    /// Writer called while an item has no data source bound.
    StreamBindingMissing(String),
    /// No candidate pre-key matched the stored confirmation tag.
    KeyConfirmation,
    /// MAC mismatch on the manifest or an item.
    Auth,
    /// Declared vs. observed length mismatch.
    PayloadLength(String),
    /// Underlying sink/source failure.
    Io(String),
}

impl fmt::Display for PackageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(msg) => write!(f, "format error: {}", msg),
            Self::Config(msg) => write!(f, "config error: {}", msg),
            Self::KeyMissing(msg) => write!(f, "key missing: {}", msg),
            Self::StreamBindingMissing(msg) => write!(f, "stream binding missing: {}", msg),
            Self::KeyConfirmation => write!(f, "key confirmation failed"),
            Self::Auth => write!(f, "authentication failed"),
            Self::PayloadLength(msg) => write!(f, "payload length error: {}", msg),
            Self::Io(msg) => write!(f, "io error: {}", msg),
        }
    }
}

impl std::error::Error for PackageError {}

impl From<io::Error> for PackageError {
    fn from(e: io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Aggregates multiple pre-flight errors into a single composite error,
/// surfaced before any bytes leave the writer.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<PackageError>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: PackageError) {
        self.errors.push(err);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes the accumulator, returning `Ok(())` if empty or a single
    /// composite `PackageError::Config` joining every message otherwise.
    pub fn into_result(self) -> Result<(), PackageError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Err(PackageError::Config(format!(
            "{} pre-flight error(s): {}",
            self.errors.len(),
            joined
        )))
    }
}
