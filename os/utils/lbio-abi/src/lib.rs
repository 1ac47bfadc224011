//! # LBIO Firmware Handoff Table
//!
//! Encoding and decoding of the `LBIO` table a boot firmware leaves in memory
//! for the operating system. The table conveys facts the OS cannot probe by
//! itself: the memory map, the console UART and, when the table had to be
//! moved, the address of its relocated copy.
//!
//! ## Layout
//!
//! All fields are little-endian and 4-byte aligned. 64-bit fields stay 64-bit
//! on 32-bit consumers, so the data is position independent and can be copied
//! anywhere without changing its meaning.
//!
//! ```text
//! ┌──────────────────────────────┐  paddr
//! │ Header (24 bytes)            │  "LBIO", header_bytes, header_checksum,
//! │                              │  table_bytes, table_checksum, table_entries
//! ├──────────────────────────────┤  paddr + header_bytes
//! │ Record { tag, size, ... }    │
//! │ Record { tag, size, ... }    │  table_bytes in total
//! │ ...                          │
//! └──────────────────────────────┘
//! ```
//!
//! Every record starts with a `tag` and a `size` covering the whole record,
//! so readers skip records they do not understand.
//!
//! ## Crate Layout
//!
//! * [`checksum`]: 16-bit ones'-complement checksum.
//! * [`record`] / [`memory`]: the record codec.
//! * [`reader`]: validates a table in physical memory and iterates its records,
//!   following forward records to relocated copies.
//! * [`builder`]: assembles a checksummed table from records.
//! * [`phys`]: the physical memory seam the reader maps through.
//!
//! ## Usage
//!
//! ```rust
//! use lbio_abi::builder::build;
//! use lbio_abi::memory::{MemoryMap, MemoryRange, MemoryType};
//! use lbio_abi::phys::SliceMemory;
//! use lbio_abi::reader::Table;
//! use lbio_abi::record::Record;
//!
//! let ranges = [MemoryRange::new(0, 0x9_f000, MemoryType::Ram)];
//! let blob = build(&[Record::Memory(MemoryMap::from_ranges(&ranges))]).unwrap();
//!
//! let mem = SliceMemory::new(0x500, &blob);
//! let table = Table::open(&mem, 0x500).unwrap();
//! let map = table.memory_map().unwrap();
//! assert_eq!(map.get(0), Some(ranges[0]));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "builder")]
extern crate alloc;

#[cfg(feature = "builder")]
pub mod builder;
pub mod checksum;
pub mod error;
pub mod memory;
pub mod phys;
#[cfg(feature = "reader")]
pub mod reader;
pub mod record;

pub use error::{ChecksumRegion, LbError};

use checksum::checksum_excluding;

/// Signature at the start of every table header.
pub const LB_SIGNATURE: [u8; 4] = *b"LBIO";

/// Size of [`Header`] in bytes; `header_bytes` must carry exactly this value.
pub const HEADER_SIZE: usize = 24;

/// Size of the `tag` + `size` prefix shared by every record.
pub const RECORD_HEADER_SIZE: usize = 8;

/// Records are sized in multiples of this many bytes.
pub const RECORD_ALIGN: usize = 4;

/// Maximum number of forward records followed before giving up.
pub const MAX_FORWARD_DEPTH: usize = 4;

/// Physical windows a loader conventionally scans for the header.
pub const LOW_MEMORY_WINDOWS: [(u64, u64); 2] = [(0x0, 0x1000), (0xf_0000, 0x10_0000)];

/// Headers are placed on this alignment within [`LOW_MEMORY_WINDOWS`].
pub const SCAN_ALIGN: usize = 16;

/// Placeholder record; payload ignored.
pub const LB_TAG_UNUSED: u32 = 0x0000;
/// Memory map record.
pub const LB_TAG_MEMORY: u32 = 0x0001;
/// Serial console record.
pub const LB_TAG_SERIAL: u32 = 0x000f;
/// Relocation record pointing at another complete table.
pub const LB_TAG_FORWARD: u32 = 0x0011;

/// Byte offset of `header_checksum` within the header.
const HEADER_CHECKSUM_OFFSET: usize = 8;

/// Fixed-size table header.
///
/// The in-memory representation matches the wire layout, but parsing and
/// serialisation go through explicit little-endian reads and writes so the
/// host's endianness never matters.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Constant [`LB_SIGNATURE`].
    pub signature: [u8; 4],

    /// Size of this header; always [`HEADER_SIZE`].
    pub header_bytes: u32,

    /// Checksum of the header computed with this field as zero.
    pub header_checksum: u32,

    /// Length of the record region following the header.
    pub table_bytes: u32,

    /// Checksum of the record region.
    pub table_checksum: u32,

    /// Number of top-level records. Advisory only.
    pub table_entries: u32,
}

const _: () = assert!(size_of::<Header>() == HEADER_SIZE);

impl Default for Header {
    #[allow(clippy::cast_possible_truncation)]
    fn default() -> Self {
        Self {
            signature: LB_SIGNATURE,
            header_bytes: HEADER_SIZE as u32,
            header_checksum: 0,
            table_bytes: 0,
            table_checksum: 0,
            table_entries: 0,
        }
    }
}

impl Header {
    /// Describe a record region of `table` holding `entries` records.
    ///
    /// The header checksum is left zero; [`Header::to_bytes`] fills it in.
    ///
    /// # Errors
    /// [`LbError::InvalidRecord`] if `table` is longer than `u32::MAX` bytes.
    pub fn for_table(table: &[u8], entries: u32) -> Result<Self, LbError> {
        Ok(Self {
            table_bytes: u32::try_from(table.len()).map_err(|_| LbError::InvalidRecord)?,
            table_checksum: u32::from(checksum::checksum(table)),
            table_entries: entries,
            ..Self::default()
        })
    }

    /// Parse and validate a header from the first [`HEADER_SIZE`] bytes of `bytes`.
    ///
    /// Checks run in order: signature, `header_bytes`, header checksum.
    ///
    /// # Errors
    /// [`LbError::TruncatedHeader`] (with `paddr` 0) if fewer than
    /// [`HEADER_SIZE`] bytes are given, otherwise [`LbError::BadSignature`],
    /// [`LbError::BadHeaderSize`] or [`LbError::ChecksumMismatch`].
    pub fn parse(bytes: &[u8]) -> Result<Self, LbError> {
        let raw = bytes
            .get(..HEADER_SIZE)
            .ok_or(LbError::TruncatedHeader { paddr: 0 })?;

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&raw[..4]);
        if signature != LB_SIGNATURE {
            return Err(LbError::BadSignature { found: signature });
        }

        let hdr = Self {
            signature,
            header_bytes: read_u32_le(raw, 4),
            header_checksum: read_u32_le(raw, 8),
            table_bytes: read_u32_le(raw, 12),
            table_checksum: read_u32_le(raw, 16),
            table_entries: read_u32_le(raw, 20),
        };

        if usize::try_from(hdr.header_bytes).ok() != Some(HEADER_SIZE) {
            return Err(LbError::BadHeaderSize {
                found: hdr.header_bytes,
            });
        }

        let computed = checksum_excluding(raw, HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + 4);
        if hdr.header_checksum != u32::from(computed) {
            return Err(LbError::ChecksumMismatch {
                region: ChecksumRegion::Header,
                stored: hdr.header_checksum,
                computed,
            });
        }

        Ok(hdr)
    }

    /// Serialise the header, computing `header_checksum` over the result.
    ///
    /// The stored `header_checksum` field of `self` is ignored.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&self.signature);
        out[4..8].copy_from_slice(&self.header_bytes.to_le_bytes());
        out[12..16].copy_from_slice(&self.table_bytes.to_le_bytes());
        out[16..20].copy_from_slice(&self.table_checksum.to_le_bytes());
        out[20..24].copy_from_slice(&self.table_entries.to_le_bytes());

        let sum = u32::from(checksum::checksum(&out));
        out[HEADER_CHECKSUM_OFFSET..HEADER_CHECKSUM_OFFSET + 4].copy_from_slice(&sum.to_le_bytes());
        out
    }

    /// Verify `table_checksum` against the record region.
    ///
    /// # Errors
    /// [`LbError::ChecksumMismatch`] with [`ChecksumRegion::Table`].
    pub fn verify_table(&self, table: &[u8]) -> Result<(), LbError> {
        let computed = checksum::checksum(table);
        if self.table_checksum == u32::from(computed) {
            Ok(())
        } else {
            Err(LbError::ChecksumMismatch {
                region: ChecksumRegion::Table,
                stored: self.table_checksum,
                computed,
            })
        }
    }
}

/// Read a little-endian `u32`; the caller guarantees `off + 4 <= buf.len()`.
#[inline]
pub(crate) fn read_u32_le(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Read a little-endian `u64`; the caller guarantees `off + 8 <= buf.len()`.
#[inline]
pub(crate) fn read_u64_le(buf: &[u8], off: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[off..off + 8]);
    u64::from_le_bytes(b)
}
