/// Region a [`LbError::ChecksumMismatch`] was detected in.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChecksumRegion {
    Header,
    Table,
}

impl core::fmt::Display for ChecksumRegion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Header => f.write_str("header"),
            Self::Table => f.write_str("table"),
        }
    }
}

/// Structural and integrity failures of a table.
///
/// Every variant is terminal for the operation that raised it; there is no
/// partial result.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LbError {
    #[error("bad table signature {found:02x?}")]
    BadSignature { found: [u8; 4] },
    #[error("header claims {found} bytes")]
    BadHeaderSize { found: u32 },
    #[error("{region} checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch {
        region: ChecksumRegion,
        stored: u32,
        computed: u16,
    },
    #[error("no header readable at physical address {paddr:#x}")]
    TruncatedHeader { paddr: u64 },
    #[error("record at offset {offset} is truncated")]
    TruncatedRecord { offset: usize },
    #[error("record at offset {offset} has unaligned size {size}")]
    MisalignedRecord { offset: usize, size: u32 },
    #[error("record stream does not end on the table boundary (offset {offset})")]
    TrailingBytes { offset: usize },
    #[error("forward chain deeper than {depth} hops")]
    ForwardLoopExceeded { depth: usize },
    #[error("record cannot be encoded")]
    InvalidRecord,
}
