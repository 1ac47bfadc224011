//! # Table Reader
//!
//! [`Table::open`] validates a table in physical memory together with every
//! table it forwards to, then hands out its records lazily. [`Table::scan`]
//! finds a table by probing for its signature.

use crate::memory::MemoryMap;
use crate::phys::PhysMapRo;
use crate::record::{Record, RecordStream, Serial};
use crate::{
    HEADER_SIZE, Header, LB_SIGNATURE, LOW_MEMORY_WINDOWS, LbError, MAX_FORWARD_DEPTH, SCAN_ALIGN,
};
use log::{debug, trace, warn};

/// Tables visited along a relocation chain, the first one included.
const MAX_SEGMENTS: usize = MAX_FORWARD_DEPTH + 1;

/// One validated table along the relocation chain.
///
/// Only [`Table::open`] creates segments:
///
/// ```compile_fail
/// let _ = lbio_abi::reader::Segment::default();
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Segment<'m> {
    paddr: u64,
    header: Header,
    records: &'m [u8],
}

impl<'m> Segment<'m> {
    /// Filler for unused slots of [`Table::segments`]; never handed out.
    fn vacant() -> Self {
        Self {
            paddr: 0,
            header: Header::default(),
            records: &[],
        }
    }

    /// Physical address of this table's header.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.paddr
    }

    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.header
    }

    /// The raw record region (`table_bytes` long).
    #[must_use]
    pub const fn record_bytes(&self) -> &'m [u8] {
        self.records
    }

    /// Validate the table at `paddr` and walk its records once.
    ///
    /// Returns the segment and the target of its forward record, if any.
    fn load<M: PhysMapRo + ?Sized>(
        mem: &'m M,
        paddr: u64,
    ) -> Result<(Self, Option<u64>), LbError> {
        let raw = mem
            .map_ro(paddr, HEADER_SIZE)
            .ok_or(LbError::TruncatedHeader { paddr })?;
        let header = Header::parse(raw)?;

        let table_len =
            usize::try_from(header.table_bytes).map_err(|_| LbError::TruncatedRecord { offset: 0 })?;
        let records = paddr
            .checked_add(u64::from(header.header_bytes))
            .and_then(|table_paddr| mem.map_ro(table_paddr, table_len))
            .ok_or(LbError::TruncatedRecord { offset: 0 })?;

        header.verify_table(records)?;

        let mut forward = None;
        let mut decoded = 0u32;
        for item in RecordStream::new(records) {
            let (offset, record) = item?;
            decoded = decoded.saturating_add(1);
            match record {
                Record::Forward { forward: target } => {
                    if let Some(previous) = forward.replace(target) {
                        warn!(
                            "table at {paddr:#x} forwards more than once; {target:#x} replaces {previous:#x}"
                        );
                    }
                }
                Record::Unknown { tag, size, .. } => {
                    trace!("unknown record {tag:#06x} ({size} bytes) at +{offset}");
                }
                record => trace!("record {:#06x} at +{offset}", record.tag()),
            }
        }

        if decoded != header.table_entries {
            warn!(
                "table at {paddr:#x} claims {} entries but holds {decoded}",
                header.table_entries
            );
        }
        debug!(
            "LBIO table at {paddr:#x}: {} bytes, {decoded} records",
            header.table_bytes
        );

        Ok((
            Self {
                paddr,
                header,
                records,
            },
            forward,
        ))
    }
}

/// A validated firmware table, including every table it forwards to.
///
/// [`Table::open`] checks the headers, checksums and record framing of the
/// whole relocation chain up front; iterating afterwards cannot fail.
#[derive(Debug, Clone)]
pub struct Table<'m> {
    segments: [Segment<'m>; MAX_SEGMENTS],
    /// Number of valid entries in `segments`; at least one.
    count: usize,
}

impl<'m> Table<'m> {
    /// Open the table whose header sits at physical address `paddr`.
    ///
    /// Forward records are followed up to [`MAX_FORWARD_DEPTH`] hops.
    ///
    /// # Errors
    /// Any [`LbError`] raised by a table along the chain, or
    /// [`LbError::ForwardLoopExceeded`] if the chain is too deep.
    pub fn open<M: PhysMapRo + ?Sized>(mem: &'m M, paddr: u64) -> Result<Self, LbError> {
        let mut segments = [Segment::vacant(); MAX_SEGMENTS];
        let mut count = 0;
        let mut next = Some(paddr);

        while let Some(addr) = next {
            let slot = segments
                .get_mut(count)
                .ok_or(LbError::ForwardLoopExceeded {
                    depth: MAX_FORWARD_DEPTH,
                })?;
            let (segment, forward) = Segment::load(mem, addr)?;
            *slot = segment;
            count += 1;

            if let Some(target) = forward {
                debug!("table at {addr:#x} relocated to {target:#x}");
            }
            next = forward;
        }

        Ok(Self { segments, count })
    }

    /// Probe `start..end` on [`SCAN_ALIGN`] boundaries and open the first
    /// table that validates.
    #[must_use]
    pub fn scan<M: PhysMapRo + ?Sized>(mem: &'m M, start: u64, end: u64) -> Option<Self> {
        let align = SCAN_ALIGN as u64;
        let first = start.checked_next_multiple_of(align)?;

        (first..end).step_by(SCAN_ALIGN).find_map(|paddr| {
            let sig = mem.map_ro(paddr, LB_SIGNATURE.len())?;
            if sig != LB_SIGNATURE.as_slice() {
                return None;
            }
            match Self::open(mem, paddr) {
                Ok(table) => Some(table),
                Err(e) => {
                    debug!("candidate table at {paddr:#x} rejected: {e}");
                    None
                }
            }
        })
    }

    /// [`Table::scan`] over the [`LOW_MEMORY_WINDOWS`].
    #[must_use]
    pub fn scan_low_memory<M: PhysMapRo + ?Sized>(mem: &'m M) -> Option<Self> {
        LOW_MEMORY_WINDOWS
            .iter()
            .find_map(|&(start, end)| Self::scan(mem, start, end))
    }

    /// Every table visited, in the order they were followed.
    pub fn segments(&self) -> impl Iterator<Item = &Segment<'m>> {
        self.segments[..self.count].iter()
    }

    /// The last table in the chain, i.e. the one no longer forwarded.
    const fn authoritative(&self) -> &Segment<'m> {
        &self.segments[self.count - 1]
    }

    /// Physical address of the authoritative table.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.authoritative().paddr
    }

    /// Header of the authoritative table.
    #[must_use]
    pub const fn header(&self) -> &Header {
        &self.authoritative().header
    }

    /// Records of the whole chain as one sequence, forward records elided.
    #[must_use]
    pub fn records(&self) -> Records<'_, 'm> {
        Records {
            segments: self.segments[..self.count].iter(),
            stream: None,
        }
    }

    /// Number of records [`Table::records`] yields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records().count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records().next().is_none()
    }

    /// The first memory map record.
    #[must_use]
    pub fn memory_map(&self) -> Option<MemoryMap<'m>> {
        self.records().find_map(|record| match record {
            Record::Memory(map) => Some(map),
            _ => None,
        })
    }

    /// The first serial console record.
    #[must_use]
    pub fn serial(&self) -> Option<Serial> {
        self.records().find_map(|record| match record {
            Record::Serial(serial) => Some(serial),
            _ => None,
        })
    }
}

/// Iterator over the records of a [`Table`].
#[derive(Clone)]
pub struct Records<'t, 'm> {
    segments: core::slice::Iter<'t, Segment<'m>>,
    stream: Option<RecordStream<'m>>,
}

impl<'m> Iterator for Records<'_, 'm> {
    type Item = Record<'m>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(stream) = &mut self.stream {
                match stream.next() {
                    Some(Ok((_, Record::Forward { .. }))) => continue,
                    Some(Ok((_, record))) => return Some(record),
                    // framing was verified in `Table::open`
                    Some(Err(_)) | None => self.stream = None,
                }
            }

            let segment = self.segments.next()?;
            self.stream = Some(RecordStream::new(segment.records));
        }
    }
}

impl core::iter::FusedIterator for Records<'_, '_> {}
