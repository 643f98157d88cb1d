//! UM1 hybrid key agreement over Curve25519.
//!
//! Elliptic-curve arithmetic itself is an external collaborator — this
//! module is a thin seam over `x25519-dalek`.
//!
//! UM1 combines a per-package ephemeral keypair `(r, R)` with two static
//! keypairs, sender `(a, A)` and recipient `(b, B)`:
//!
//! ```text
//! writer (holds a, knows B, generates r):  DH(r, B) || DH(a, B)
//! reader (holds b, knows A and R):          DH(b, R) || DH(b, A)
//! ```
//!
//! These are equal because Diffie-Hellman is commutative: `r·B = b·R` and
//! `a·B = b·A`. The 64-byte combined secret is fed into the key stretcher
//! (`crate::kdf::stretch`) exactly like a symmetric pre-key.

use x25519_dalek::{EphemeralSecret, PublicKey as XPublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::entropy::EntropySource;
use crate::error::PackageError;

pub const PUBLIC_KEY_BYTES: usize = 32;
pub const SECRET_KEY_BYTES: usize = 32;

#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey(pub(crate) [u8; PUBLIC_KEY_BYTES]);

impl PublicKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let arr: [u8; PUBLIC_KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| PackageError::Format("UM1 public key must be 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_BYTES] {
        self.0
    }

    fn dalek(&self) -> XPublicKey {
        XPublicKey::from(self.0)
    }
}

pub struct SecretKey(StaticSecret);

impl SecretKey {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PackageError> {
        let arr: [u8; SECRET_KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| PackageError::Format("UM1 secret key must be 32 bytes".into()))?;
        Ok(Self(StaticSecret::from(arr)))
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_BYTES] {
        self.0.to_bytes()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(XPublicKey::from(&self.0).to_bytes())
    }
}

/// Generates a long-term static keypair (`ocpkg keygen`, CLI-facing).
pub fn generate_static_keypair(entropy: &mut dyn EntropySource) -> (PublicKey, SecretKey) {
    let mut seed = [0u8; 32];
    entropy.fill(&mut seed);
    let secret = StaticSecret::from(seed);
    let public = PublicKey(XPublicKey::from(&secret).to_bytes());
    (public, SecretKey(secret))
}

/// Writer side: generates the per-package ephemeral keypair and computes
/// the combined shared secret `DH(r, B) || DH(a, B)`.
///
/// Returns `(combined_secret, ephemeral_public_key_bytes)`.
pub fn writer_agree(
    sender_secret: &SecretKey,
    recipient_public: &PublicKey,
    entropy: &mut dyn EntropySource,
) -> (Zeroizing<Vec<u8>>, [u8; PUBLIC_KEY_BYTES]) {
    let mut seed = [0u8; 32];
    entropy.fill(&mut seed);
    let ephemeral = EphemeralSecret::random_from_rng(RngAdapter(seed));
    let ephemeral_public = XPublicKey::from(&ephemeral);

    let recipient = recipient_public.dalek();
    let er = ephemeral.diffie_hellman(&recipient);
    let ar = sender_secret.0.diffie_hellman(&recipient);

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(er.as_bytes());
    combined.extend_from_slice(ar.as_bytes());

    (Zeroizing::new(combined), ephemeral_public.to_bytes())
}

/// Reader side: combines the candidate `(sender_pub, recipient_priv)` pair
/// with the manifest's carried ephemeral public key to recompute the
/// shared secret `DH(b, R) || DH(b, A)`.
pub fn reader_agree(
    recipient_secret: &SecretKey,
    sender_public: &PublicKey,
    ephemeral_public: &PublicKey,
) -> Zeroizing<Vec<u8>> {
    let ephemeral = ephemeral_public.dalek();
    let sender = sender_public.dalek();

    let rb = recipient_secret.0.diffie_hellman(&ephemeral);
    let ab = recipient_secret.0.diffie_hellman(&sender);

    let mut combined = Vec::with_capacity(64);
    combined.extend_from_slice(rb.as_bytes());
    combined.extend_from_slice(ab.as_bytes());
    Zeroizing::new(combined)
}

/// Adapts a fixed 32-byte seed to `rand_core::CryptoRngCore` so ephemeral
/// key generation draws from the package's `EntropySource` instead of a
/// process-global RNG (Design Note §9).
struct RngAdapter([u8; 32]);

impl rand_core::RngCore for RngAdapter {
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }
    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        // Deterministic stream derived from the one-shot seed: sufficient
        // because x25519-dalek's `EphemeralSecret::random_from_rng` only
        // ever draws exactly 32 bytes from this adapter.
        let n = dest.len().min(32);
        dest[..n].copy_from_slice(&self.0[..n]);
        for b in dest[n..].iter_mut() {
            *b = 0;
        }
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl rand_core::CryptoRng for RngAdapter {}
