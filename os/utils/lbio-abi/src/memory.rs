//! # Memory Map Payload
//!
//! A memory map record carries a flat array of [`MemoryRange`] entries. The
//! number of entries is derived from the record length,
//! `(size - 8) / MEMORY_RANGE_SIZE`; a partial trailing entry is ignored.
//! Ranges are reported as the firmware wrote them: neither sorted nor checked
//! for overlap.

use crate::{read_u32_le, read_u64_le};

/// Bytes occupied by one range entry (20 bytes of fields, 4 bytes padding).
pub const MEMORY_RANGE_SIZE: usize = 24;

/// Memory anyone can use.
pub const LB_MEM_RAM: u32 = 1;
/// Don't use this memory region.
pub const LB_MEM_RESERVED: u32 = 2;
/// ACPI tables.
pub const LB_MEM_ACPI: u32 = 3;
/// ACPI NVS memory.
pub const LB_MEM_NVS: u32 = 4;
/// Unusable address space.
pub const LB_MEM_UNUSABLE: u32 = 5;
/// Vendor reserved.
pub const LB_MEM_VENDOR_RSVD: u32 = 6;
/// RAM holding configuration tables, including this one.
pub const LB_MEM_TABLE: u32 = 16;

/// Kind of a [`MemoryRange`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MemoryType {
    Ram,
    Reserved,
    Acpi,
    Nvs,
    Unusable,
    VendorReserved,
    Table,
    /// A code this crate does not know; kept verbatim.
    Other(u32),
}

impl From<u32> for MemoryType {
    fn from(value: u32) -> Self {
        match value {
            LB_MEM_RAM => Self::Ram,
            LB_MEM_RESERVED => Self::Reserved,
            LB_MEM_ACPI => Self::Acpi,
            LB_MEM_NVS => Self::Nvs,
            LB_MEM_UNUSABLE => Self::Unusable,
            LB_MEM_VENDOR_RSVD => Self::VendorReserved,
            LB_MEM_TABLE => Self::Table,
            other => Self::Other(other),
        }
    }
}

impl From<MemoryType> for u32 {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::Ram => LB_MEM_RAM,
            MemoryType::Reserved => LB_MEM_RESERVED,
            MemoryType::Acpi => LB_MEM_ACPI,
            MemoryType::Nvs => LB_MEM_NVS,
            MemoryType::Unusable => LB_MEM_UNUSABLE,
            MemoryType::VendorReserved => LB_MEM_VENDOR_RSVD,
            MemoryType::Table => LB_MEM_TABLE,
            MemoryType::Other(other) => other,
        }
    }
}

/// One physical memory range.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct MemoryRange {
    /// Physical start address.
    pub start: u64,
    /// Length in bytes.
    pub size: u64,
    pub kind: MemoryType,
}

impl MemoryRange {
    #[must_use]
    pub const fn new(start: u64, size: u64, kind: MemoryType) -> Self {
        Self { start, size, kind }
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }

    /// Whether the OS may allocate from this range.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, MemoryType::Ram)
    }

    /// Decode the entry at the start of `raw`; `raw` holds at least
    /// [`MEMORY_RANGE_SIZE`] bytes.
    fn read(raw: &[u8]) -> Self {
        Self {
            start: read_u64_le(raw, 0),
            size: read_u64_le(raw, 8),
            kind: MemoryType::from(read_u32_le(raw, 16)),
        }
    }

    /// Encode into the first [`MEMORY_RANGE_SIZE`] bytes of `out`, padding zeroed.
    #[cfg_attr(not(feature = "builder"), allow(dead_code))]
    pub(crate) fn write(&self, out: &mut [u8]) {
        out[0..8].copy_from_slice(&self.start.to_le_bytes());
        out[8..16].copy_from_slice(&self.size.to_le_bytes());
        out[16..20].copy_from_slice(&u32::from(self.kind).to_le_bytes());
        out[20..MEMORY_RANGE_SIZE].fill(0);
    }
}

/// The ranges of a memory map record.
///
/// Either a view over the raw payload of a decoded record, or a borrowed slice
/// of ranges handed to the builder. Both compare equal when they describe the
/// same ranges in the same order.
#[derive(Clone, Copy)]
pub struct MemoryMap<'a> {
    repr: Repr<'a>,
}

#[derive(Clone, Copy)]
enum Repr<'a> {
    Raw(&'a [u8]),
    Ranges(&'a [MemoryRange]),
}

impl<'a> MemoryMap<'a> {
    /// A memory map listing `ranges`.
    #[must_use]
    pub const fn from_ranges(ranges: &'a [MemoryRange]) -> Self {
        Self {
            repr: Repr::Ranges(ranges),
        }
    }

    /// A memory map over a record payload (the bytes after `tag` and `size`).
    pub(crate) const fn from_payload(payload: &'a [u8]) -> Self {
        Self {
            repr: Repr::Raw(payload),
        }
    }

    /// Number of ranges.
    #[must_use]
    pub const fn len(&self) -> usize {
        match self.repr {
            Repr::Raw(payload) => payload.len() / MEMORY_RANGE_SIZE,
            Repr::Ranges(ranges) => ranges.len(),
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Range `i`, or `None` past the end.
    #[must_use]
    pub fn get(&self, i: usize) -> Option<MemoryRange> {
        match self.repr {
            Repr::Raw(payload) => {
                if i >= self.len() {
                    return None;
                }
                let off = i * MEMORY_RANGE_SIZE;
                Some(MemoryRange::read(&payload[off..off + MEMORY_RANGE_SIZE]))
            }
            Repr::Ranges(ranges) => ranges.get(i).copied(),
        }
    }

    #[must_use]
    pub const fn iter(&self) -> MemoryRanges<'a> {
        MemoryRanges { map: *self, idx: 0 }
    }

    /// Encoded payload length in bytes.
    #[cfg_attr(not(feature = "builder"), allow(dead_code))]
    pub(crate) const fn payload_len(&self) -> usize {
        self.len() * MEMORY_RANGE_SIZE
    }
}

impl PartialEq for MemoryMap<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl Eq for MemoryMap<'_> {}

impl core::fmt::Debug for MemoryMap<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for MemoryMap<'a> {
    type Item = MemoryRange;
    type IntoIter = MemoryRanges<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the ranges of a [`MemoryMap`].
pub struct MemoryRanges<'a> {
    map: MemoryMap<'a>,
    idx: usize,
}

impl Iterator for MemoryRanges<'_> {
    type Item = MemoryRange;

    fn next(&mut self) -> Option<Self::Item> {
        let range = self.map.get(self.idx)?;
        self.idx += 1;
        Some(range)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let r = self.map.len().saturating_sub(self.idx);
        (r, Some(r))
    }
}

impl ExactSizeIterator for MemoryRanges<'_> {}

impl core::iter::FusedIterator for MemoryRanges<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_payload_decodes_ranges() {
        let mut payload = [0u8; 2 * MEMORY_RANGE_SIZE];
        MemoryRange::new(0, 0x9_f000, MemoryType::Ram).write(&mut payload[..24]);
        MemoryRange::new(0xf_0000, 0x1_0000, MemoryType::Table).write(&mut payload[24..]);

        let map = MemoryMap::from_payload(&payload);
        assert_eq!(map.len(), 2);
        assert_eq!(map.get(1), Some(MemoryRange::new(0xf_0000, 0x1_0000, MemoryType::Table)));
        assert_eq!(map.get(2), None);
    }

    #[test]
    fn partial_trailing_entry_is_ignored() {
        let payload = [0u8; MEMORY_RANGE_SIZE + 12];
        let map = MemoryMap::from_payload(&payload);
        assert_eq!(map.len(), 1);
        assert_eq!(map.iter().count(), 1);
    }

    #[test]
    fn unknown_type_codes_survive() {
        assert_eq!(MemoryType::from(42), MemoryType::Other(42));
        assert_eq!(u32::from(MemoryType::Other(42)), 42);
        assert_eq!(u32::from(MemoryType::from(LB_MEM_TABLE)), 16);
    }

    #[test]
    fn raw_and_slice_views_compare_equal() {
        let ranges = [MemoryRange::new(0x10_0000, 0x1ff0_0000, MemoryType::Ram)];
        let mut payload = [0u8; MEMORY_RANGE_SIZE];
        ranges[0].write(&mut payload);

        assert_eq!(MemoryMap::from_payload(&payload), MemoryMap::from_ranges(&ranges));
        assert_ne!(MemoryMap::from_payload(&payload), MemoryMap::from_ranges(&[]));
    }

    #[test]
    fn range_end_saturates() {
        let r = MemoryRange::new(u64::MAX - 1, 16, MemoryType::Reserved);
        assert_eq!(r.end(), u64::MAX);
        assert!(!r.is_usable());
    }
}
