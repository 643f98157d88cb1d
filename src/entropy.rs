//! Explicit entropy collaborator (Design Note §9: no process-wide RNG
//! singleton). Passed into the writer and into padding/IV generators.

use rand_core::{OsRng, RngCore};

/// Source of cryptographically secure random bytes.
///
/// Implementors back IV/nonce generation, Frameshift/Fabric padding
/// lengths and contents, UM1 ephemeral key generation, and PRNG seeding.
pub trait EntropySource: Send {
    fn fill(&mut self, buf: &mut [u8]);

    fn bytes(&mut self, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.fill(&mut buf);
        buf
    }
}

/// Default entropy source backed by the operating system CSPRNG.
#[derive(Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&mut self, buf: &mut [u8]) {
        OsRng.fill_bytes(buf);
    }
}

#[cfg(test)]
pub(crate) struct FixedEntropy {
    pub byte: u8,
}

#[cfg(test)]
impl EntropySource for FixedEntropy {
    fn fill(&mut self, buf: &mut [u8]) {
        buf.fill(self.byte);
    }
}
