//! # Table Builder
//!
//! Produces a contiguous header + record image. Records are framed and
//! padded, but their contents are taken as given: overlapping memory ranges
//! and the like are the producer's business.

use alloc::vec;
use alloc::vec::Vec;

use crate::record::Record;
use crate::{HEADER_SIZE, Header, LbError};

/// Accumulates records into a table image.
///
/// The header is reserved up front and patched in by [`TableBuilder::finish`]
/// once the record region and its checksum are known.
#[derive(Debug, Clone)]
pub struct TableBuilder {
    out: Vec<u8>,
    entries: u32,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            out: vec![0; HEADER_SIZE],
            entries: 0,
        }
    }

    /// Append one record.
    ///
    /// # Errors
    /// [`LbError::InvalidRecord`] if the record cannot be framed or the entry
    /// count overflows; the builder is unchanged in that case.
    pub fn push(&mut self, record: &Record<'_>) -> Result<&mut Self, LbError> {
        let entries = self.entries.checked_add(1).ok_or(LbError::InvalidRecord)?;
        record.encode_into(&mut self.out)?;
        self.entries = entries;
        Ok(self)
    }

    /// Number of records pushed so far.
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.entries
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Checksum the record region, write the header and return the image.
    ///
    /// # Errors
    /// [`LbError::InvalidRecord`] if the record region exceeds `u32::MAX` bytes.
    pub fn finish(mut self) -> Result<Vec<u8>, LbError> {
        let header = Header::for_table(&self.out[HEADER_SIZE..], self.entries)?;
        self.out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
        Ok(self.out)
    }
}

/// Build a table image holding `records` in order.
///
/// # Errors
/// [`LbError::InvalidRecord`] for the first record that cannot be framed.
pub fn build(records: &[Record<'_>]) -> Result<Vec<u8>, LbError> {
    let mut builder = TableBuilder::new();
    for record in records {
        builder.push(record)?;
    }
    builder.finish()
}

/// A table whose only record forwards to the table at `target`.
///
/// Left behind at the conventional location when the real table is moved.
///
/// # Errors
/// Never fails in practice; the signature matches [`build`].
pub fn forward_stub(target: u64) -> Result<Vec<u8>, LbError> {
    build(&[Record::Forward { forward: target }])
}
