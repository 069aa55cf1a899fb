//! Binary feature-space interchange layout.
//!
//! The wire form of a [`FeatureSpaceSet`] is the concatenation of its
//! spaces, each laid out as:
//!
//! ```text
//! [name: 1 byte][count: u32 LE][(index: 4 or 8 bytes LE)(value: f32 LE)] x count
//! ```
//!
//! The buffer is self-describing given the index width: decoding walks the
//! length prefixes, so no trailing sentinel or outer framing is needed.
//! Index width is not stored in the buffer; both sides derive it from the
//! configured bit precision ([`IndexWidth::for_bits`]), the same way they
//! already agree on the hash mode.
//!
//! Encoding copies out of the set and decoding copies into a fresh set;
//! neither side retains a reference to the caller's memory.

use crate::error::{HopperError, Result};
use crate::feature::{FeatureSpace, FeatureSpaceSet};

// =============================================================================
// Index Width
// =============================================================================

/// Wire width of a feature index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexWidth {
    /// 4-byte indices; enough for address spaces up to 32 bits.
    U32,
    /// 8-byte indices for wider address spaces.
    U64,
}

impl IndexWidth {
    /// Narrowest width that can carry every index of a `2^bits` space.
    pub fn for_bits(bits: u32) -> Self {
        if bits > 32 {
            Self::U64
        } else {
            Self::U32
        }
    }

    /// Bytes per index on the wire.
    pub fn bytes(self) -> usize {
        match self {
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    fn max_index(self) -> u64 {
        match self {
            Self::U32 => u32::MAX as u64,
            Self::U64 => u64::MAX,
        }
    }

    /// Bytes per `(index, value)` entry.
    fn entry_bytes(self) -> usize {
        self.bytes() + 4
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Exact encoded size of a set under the given width.
pub fn encoded_len(set: &FeatureSpaceSet, width: IndexWidth) -> usize {
    set.iter()
        .map(|space| 1 + 4 + space.len() * width.entry_bytes())
        .sum()
}

/// Serialize a feature-space set.
///
/// Fails with [`HopperError::UnsupportedNamespaceId`] when a space name
/// does not fit the single-byte name field, and with
/// [`HopperError::IndexOverflow`] when a feature index (or a space's
/// feature count) does not fit its field.
pub fn encode(set: &FeatureSpaceSet, width: IndexWidth) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(encoded_len(set, width));

    for space in set {
        if !space.name.is_ascii() {
            return Err(HopperError::UnsupportedNamespaceId(space.name));
        }
        out.push(space.name as u8);

        let count = u32::try_from(space.features.len()).map_err(|_| {
            HopperError::IndexOverflow {
                index: space.features.len() as u64,
                width_bytes: 4,
            }
        })?;
        out.extend_from_slice(&count.to_le_bytes());

        for feature in &space.features {
            if feature.index > width.max_index() {
                return Err(HopperError::IndexOverflow {
                    index: feature.index,
                    width_bytes: width.bytes(),
                });
            }
            match width {
                IndexWidth::U32 => {
                    out.extend_from_slice(&(feature.index as u32).to_le_bytes())
                }
                IndexWidth::U64 => out.extend_from_slice(&feature.index.to_le_bytes()),
            }
            out.extend_from_slice(&feature.value.to_le_bytes());
        }
    }

    Ok(out)
}

// =============================================================================
// Decoding
// =============================================================================

/// Deserialize a feature-space set; the exact inverse of [`encode`].
///
/// Fails with [`HopperError::TruncatedBuffer`] when a space header or its
/// declared payload extends past the end of the buffer.
pub fn decode(bytes: &[u8], width: IndexWidth) -> Result<FeatureSpaceSet> {
    let mut reader = Reader::new(bytes);
    let mut set = FeatureSpaceSet::new();

    while !reader.is_empty() {
        let name = reader.byte()? as char;
        let count = reader.u32()? as usize;

        // Check the whole declared payload before reading entries, so a
        // lying count fails with the full shortfall rather than partway in.
        let payload = count * width.entry_bytes();
        if payload > reader.remaining() {
            return Err(HopperError::TruncatedBuffer {
                needed: payload,
                available: reader.remaining(),
            });
        }

        let mut space = FeatureSpace::new(name);
        for _ in 0..count {
            let index = match width {
                IndexWidth::U32 => reader.u32()? as u64,
                IndexWidth::U64 => reader.u64()?,
            };
            let value = f32::from_le_bytes(reader.array()?);
            space.push(index, value);
        }
        set.push(space);
    }

    Ok(set)
}

/// Cursor over the interchange buffer; every read is bounds-checked.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(HopperError::TruncatedBuffer {
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn byte(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.array()?))
    }
}
