//! Deterministic feature hashing.
//!
//! Maps namespace names and feature tokens to weight indices inside a
//! `2^bits` address space. The derivation is pure: a SHA-256 digest over
//! the seed and the token bytes, truncated to the first eight bytes as a
//! little-endian `u64`. The same `(mode, bits, namespace, token)` quadruple
//! yields the same index on every platform and every run, so a model
//! trained on one host scores on another.
//!
//! Two modes mirror the engine's `--hash` option:
//!
//! * [`HashMode::Strings`]: tokens that are entirely ASCII digits are
//!   treated as pre-hashed indices and added to the namespace seed
//!   directly; everything else goes through the digest.
//! * [`HashMode::All`]: every token goes through the digest, digits
//!   included.

use sha2::{Digest, Sha256};

use crate::codec::IndexWidth;
use crate::options::EngineOptions;

// =============================================================================
// Hash Mode
// =============================================================================

/// Token hashing policy, selected by the `--hash` engine option.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashMode {
    /// Hash every token.
    All,
    /// Treat all-digit tokens as literal indices; hash the rest.
    Strings,
}

// =============================================================================
// Hash Context
// =============================================================================

/// Immutable hashing configuration shared by the parser and the codecs.
#[derive(Clone, Copy, Debug)]
pub struct HashContext {
    mode: HashMode,
    bits: u32,
    mask: u64,
}

impl HashContext {
    /// Create a context for a `2^bits` address space.
    pub fn new(mode: HashMode, bits: u32) -> Self {
        Self {
            mode,
            bits,
            mask: (1u64 << bits) - 1,
        }
    }

    /// Create a context from parsed engine options.
    pub fn from_options(opts: &EngineOptions) -> Self {
        Self::new(opts.hash_mode, opts.bits)
    }

    /// Address-space bit width.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Index mask (`2^bits - 1`); every feature index satisfies
    /// `index & mask == index`.
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Hashing mode in effect.
    pub fn mode(&self) -> HashMode {
        self.mode
    }

    /// Narrowest interchange index width that can carry this address space.
    pub fn index_width(&self) -> IndexWidth {
        IndexWidth::for_bits(self.bits)
    }

    /// Hash a namespace name into the seed for its features.
    ///
    /// The seed is deliberately unmasked: masking happens once, on the
    /// final feature index. The unnamed default namespace seeds at zero.
    pub fn hash_namespace(&self, name: &str) -> u64 {
        if name.is_empty() {
            return 0;
        }
        derive(0, name.as_bytes())
    }

    /// Hash a feature token under a namespace seed into a masked index.
    ///
    /// In [`HashMode::Strings`], an all-digit token is its own index:
    /// the numeric value is added to the seed and masked, with no digest
    /// in between.
    pub fn hash_feature(&self, token: &str, seed: u64) -> u64 {
        if self.mode == HashMode::Strings {
            if let Some(numeric) = parse_numeric(token) {
                return numeric.wrapping_add(seed) & self.mask;
            }
        }
        derive(seed, token.as_bytes()) & self.mask
    }
}

// =============================================================================
// Derivation
// =============================================================================

/// SHA-256 over `seed || material`, truncated to a little-endian `u64`.
fn derive(seed: u64, material: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(seed.to_le_bytes());
    hasher.update(material);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Parse a token consisting solely of ASCII digits, if it fits a `u64`.
fn parse_numeric(token: &str) -> Option<u64> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}
