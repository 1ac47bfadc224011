//! # Record Codec
//!
//! Every record starts with a little-endian `tag` and `size`, where `size`
//! covers the whole record including those eight bytes and is a multiple of
//! [`RECORD_ALIGN`]. Tags this crate does not know decode to
//! [`Record::Unknown`] so callers can skip them.

#[cfg(feature = "builder")]
use alloc::vec::Vec;

use crate::memory::MemoryMap;
use crate::{
    LB_TAG_FORWARD, LB_TAG_MEMORY, LB_TAG_SERIAL, LB_TAG_UNUSED, LbError, RECORD_ALIGN,
    RECORD_HEADER_SIZE, read_u32_le, read_u64_le,
};

/// Payload bytes of a serial record.
pub const SERIAL_PAYLOAD_SIZE: usize = 24;

/// Payload bytes of a forward record.
pub const FORWARD_PAYLOAD_SIZE: usize = 8;

/// Port-I/O mapped UART.
pub const LB_SERIAL_TYPE_IO_MAPPED: u32 = 1;
/// Memory-mapped UART.
pub const LB_SERIAL_TYPE_MEMORY_MAPPED: u32 = 2;

/// A decoded record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// Placeholder of `size` bytes; contents ignored.
    Unused { size: u32 },
    Memory(MemoryMap<'a>),
    Serial(Serial),
    /// Physical address of the relocated table.
    Forward { forward: u64 },
    /// A tag this crate does not interpret.
    Unknown {
        tag: u32,
        size: u32,
        payload: &'a [u8],
    },
}

/// How the console UART is attached.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SerialType {
    IoMapped,
    MemoryMapped,
    Other(u32),
}

impl From<u32> for SerialType {
    fn from(value: u32) -> Self {
        match value {
            LB_SERIAL_TYPE_IO_MAPPED => Self::IoMapped,
            LB_SERIAL_TYPE_MEMORY_MAPPED => Self::MemoryMapped,
            other => Self::Other(other),
        }
    }
}

impl From<SerialType> for u32 {
    fn from(value: SerialType) -> Self {
        match value {
            SerialType::IoMapped => LB_SERIAL_TYPE_IO_MAPPED,
            SerialType::MemoryMapped => LB_SERIAL_TYPE_MEMORY_MAPPED,
            SerialType::Other(other) => other,
        }
    }
}

/// Console UART configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Serial {
    pub kind: SerialType,
    /// I/O port or physical MMIO base, depending on [`Serial::kind`].
    pub base_address: u32,
    pub baud: u32,
    /// Distance between registers in bytes.
    pub register_width: u32,
    /// UART input clock in Hz.
    pub input_clock_hz: u32,
    /// PCI address of the UART, or zero when not on PCI.
    pub uart_pci_address: u32,
}

impl Serial {
    /// Decode from a payload. Bytes past the known layout are ignored so newer
    /// firmware can append fields.
    fn read(payload: &[u8]) -> Option<Self> {
        if payload.len() < SERIAL_PAYLOAD_SIZE {
            return None;
        }
        Some(Self {
            kind: SerialType::from(read_u32_le(payload, 0)),
            base_address: read_u32_le(payload, 4),
            baud: read_u32_le(payload, 8),
            register_width: read_u32_le(payload, 12),
            input_clock_hz: read_u32_le(payload, 16),
            uart_pci_address: read_u32_le(payload, 20),
        })
    }

    #[cfg(feature = "builder")]
    fn write(&self, out: &mut Vec<u8>) {
        for field in [
            u32::from(self.kind),
            self.base_address,
            self.baud,
            self.register_width,
            self.input_clock_hz,
            self.uart_pci_address,
        ] {
            out.extend_from_slice(&field.to_le_bytes());
        }
    }
}

impl Record<'_> {
    /// Tag this record is framed with.
    #[must_use]
    pub const fn tag(&self) -> u32 {
        match self {
            Self::Unused { .. } => LB_TAG_UNUSED,
            Self::Memory(_) => LB_TAG_MEMORY,
            Self::Serial(_) => LB_TAG_SERIAL,
            Self::Forward { .. } => LB_TAG_FORWARD,
            Self::Unknown { tag, .. } => *tag,
        }
    }
}

/// Decode the record at `offset` within `bytes`.
///
/// Returns the record and the number of bytes it occupies.
///
/// # Errors
/// * [`LbError::TruncatedRecord`] if fewer than eight bytes remain, if `size`
///   is below eight or beyond the end of `bytes`, or if a known tag's payload
///   is shorter than its layout.
/// * [`LbError::MisalignedRecord`] if `size` is not a multiple of
///   [`RECORD_ALIGN`].
pub fn decode_record(bytes: &[u8], offset: usize) -> Result<(Record<'_>, usize), LbError> {
    let truncated = LbError::TruncatedRecord { offset };

    let rest = bytes
        .get(offset..)
        .filter(|rest| rest.len() >= RECORD_HEADER_SIZE)
        .ok_or(truncated)?;

    let tag = read_u32_le(rest, 0);
    let size = read_u32_le(rest, 4);
    let len = usize::try_from(size).map_err(|_| truncated)?;

    if len < RECORD_HEADER_SIZE || len > rest.len() {
        return Err(truncated);
    }
    if len % RECORD_ALIGN != 0 {
        return Err(LbError::MisalignedRecord { offset, size });
    }

    let payload = &rest[RECORD_HEADER_SIZE..len];
    let record = match tag {
        LB_TAG_UNUSED => Record::Unused { size },
        LB_TAG_MEMORY => Record::Memory(MemoryMap::from_payload(payload)),
        LB_TAG_SERIAL => Record::Serial(Serial::read(payload).ok_or(truncated)?),
        LB_TAG_FORWARD => {
            if payload.len() < FORWARD_PAYLOAD_SIZE {
                return Err(truncated);
            }
            Record::Forward {
                forward: read_u64_le(payload, 0),
            }
        }
        tag => Record::Unknown { tag, size, payload },
    };

    Ok((record, len))
}

/// Iterator over the records of a table region of exactly `table_bytes` bytes.
///
/// Yields `(offset, record)` pairs and stops after the first error. The last
/// record must end exactly on the region boundary: slack shorter than a record
/// header, or a record running past the end, is [`LbError::TrailingBytes`].
#[derive(Debug, Clone)]
pub struct RecordStream<'a> {
    table: &'a [u8],
    offset: usize,
}

impl<'a> RecordStream<'a> {
    #[must_use]
    pub const fn new(table: &'a [u8]) -> Self {
        Self { table, offset: 0 }
    }

    fn step(&self) -> Result<(Record<'a>, usize), LbError> {
        let offset = self.offset;
        let remaining = self.table.len() - offset;
        if remaining < RECORD_HEADER_SIZE {
            return Err(LbError::TrailingBytes { offset });
        }

        let size = read_u32_le(self.table, offset + 4);
        if usize::try_from(size).is_ok_and(|size| size >= RECORD_HEADER_SIZE && size > remaining) {
            return Err(LbError::TrailingBytes { offset });
        }

        decode_record(self.table, offset)
    }
}

impl<'a> Iterator for RecordStream<'a> {
    type Item = Result<(usize, Record<'a>), LbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.table.len() {
            return None;
        }

        let offset = self.offset;
        match self.step() {
            Ok((record, len)) => {
                self.offset += len;
                Some(Ok((offset, record)))
            }
            Err(e) => {
                self.offset = self.table.len();
                Some(Err(e))
            }
        }
    }
}

impl core::iter::FusedIterator for RecordStream<'_> {}

#[cfg(feature = "builder")]
impl Record<'_> {
    const fn is_known_tag(tag: u32) -> bool {
        matches!(
            tag,
            LB_TAG_UNUSED | LB_TAG_MEMORY | LB_TAG_SERIAL | LB_TAG_FORWARD
        )
    }

    /// Size the record occupies once encoded, including padding.
    ///
    /// # Errors
    /// [`LbError::InvalidRecord`] if the record cannot be framed: an
    /// [`Record::Unused`] size below eight or unaligned, an
    /// [`Record::Unknown`] carrying a known tag or a `size` that disagrees
    /// with its padded payload, or any size that does not fit `u32`.
    pub fn encoded_len(&self) -> Result<usize, LbError> {
        let len = match self {
            Self::Unused { size } => {
                let size = usize::try_from(*size).map_err(|_| LbError::InvalidRecord)?;
                if size < RECORD_HEADER_SIZE || size % RECORD_ALIGN != 0 {
                    return Err(LbError::InvalidRecord);
                }
                size
            }
            Self::Memory(map) => RECORD_HEADER_SIZE + map.payload_len(),
            Self::Serial(_) => RECORD_HEADER_SIZE + SERIAL_PAYLOAD_SIZE,
            Self::Forward { .. } => RECORD_HEADER_SIZE + FORWARD_PAYLOAD_SIZE,
            Self::Unknown { tag, size, payload } => {
                if Self::is_known_tag(*tag) {
                    return Err(LbError::InvalidRecord);
                }
                let len = payload
                    .len()
                    .checked_add(RECORD_HEADER_SIZE + RECORD_ALIGN - 1)
                    .map(|n| n & !(RECORD_ALIGN - 1))
                    .ok_or(LbError::InvalidRecord)?;
                if usize::try_from(*size).ok() != Some(len) {
                    return Err(LbError::InvalidRecord);
                }
                len
            }
        };

        u32::try_from(len).map_err(|_| LbError::InvalidRecord)?;
        Ok(len)
    }

    /// Append the encoded record to `out`.
    ///
    /// # Errors
    /// See [`Record::encoded_len`]; nothing is written on error.
    pub fn encode_into(&self, out: &mut Vec<u8>) -> Result<(), LbError> {
        let len = self.encoded_len()?;
        let size = u32::try_from(len).map_err(|_| LbError::InvalidRecord)?;
        let start = out.len();
        out.reserve(len);

        out.extend_from_slice(&self.tag().to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());

        match self {
            Self::Unused { .. } => {}
            Self::Memory(map) => {
                let mut entry = [0u8; crate::memory::MEMORY_RANGE_SIZE];
                for range in map.iter() {
                    range.write(&mut entry);
                    out.extend_from_slice(&entry);
                }
            }
            Self::Serial(serial) => serial.write(out),
            Self::Forward { forward } => out.extend_from_slice(&forward.to_le_bytes()),
            Self::Unknown { payload, .. } => out.extend_from_slice(payload),
        }

        // zero padding up to the declared size
        out.resize(start + len, 0);
        Ok(())
    }
}

/// Encode a single record into a fresh buffer.
///
/// # Errors
/// See [`Record::encoded_len`].
#[cfg(feature = "builder")]
pub fn encode_record(record: &Record<'_>) -> Result<Vec<u8>, LbError> {
    let mut out = Vec::new();
    record.encode_into(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tag: u32, size: u32, payload: &[u8]) -> std::vec::Vec<u8> {
        let mut v = std::vec::Vec::new();
        v.extend_from_slice(&tag.to_le_bytes());
        v.extend_from_slice(&size.to_le_bytes());
        v.extend_from_slice(payload);
        v
    }

    #[test]
    fn decodes_forward() {
        let bytes = raw(LB_TAG_FORWARD, 16, &0x1234_5678_9abc_u64.to_le_bytes());
        let (rec, len) = decode_record(&bytes, 0).unwrap();
        assert_eq!(len, 16);
        assert_eq!(
            rec,
            Record::Forward {
                forward: 0x1234_5678_9abc
            }
        );
    }

    #[test]
    fn unknown_tag_is_not_an_error() {
        let bytes = raw(0x4242, 12, &[1, 2, 3, 4]);
        let (rec, len) = decode_record(&bytes, 0).unwrap();
        assert_eq!(len, 12);
        assert_eq!(
            rec,
            Record::Unknown {
                tag: 0x4242,
                size: 12,
                payload: &[1, 2, 3, 4]
            }
        );
    }

    #[test]
    fn short_buffer_is_truncated() {
        let bytes = raw(LB_TAG_UNUSED, 8, &[]);
        assert_eq!(
            decode_record(&bytes[..7], 0),
            Err(LbError::TruncatedRecord { offset: 0 })
        );
        assert_eq!(
            decode_record(&bytes, 4),
            Err(LbError::TruncatedRecord { offset: 4 })
        );
    }

    #[test]
    fn size_below_header_is_truncated() {
        let bytes = raw(LB_TAG_UNUSED, 4, &[0; 4]);
        assert_eq!(
            decode_record(&bytes, 0),
            Err(LbError::TruncatedRecord { offset: 0 })
        );
    }

    #[test]
    fn size_past_buffer_is_truncated() {
        let bytes = raw(LB_TAG_UNUSED, 16, &[0; 4]);
        assert_eq!(
            decode_record(&bytes, 0),
            Err(LbError::TruncatedRecord { offset: 0 })
        );
    }

    #[test]
    fn unaligned_size_is_rejected() {
        let bytes = raw(0x99, 10, &[0; 4]);
        assert_eq!(
            decode_record(&bytes, 0),
            Err(LbError::MisalignedRecord { offset: 0, size: 10 })
        );
    }

    #[test]
    fn short_serial_payload_is_truncated() {
        let bytes = raw(LB_TAG_SERIAL, 16, &[0; 8]);
        assert_eq!(
            decode_record(&bytes, 0),
            Err(LbError::TruncatedRecord { offset: 0 })
        );
    }

    #[test]
    fn longer_serial_payload_is_accepted() {
        let mut payload = [0u8; SERIAL_PAYLOAD_SIZE + 4];
        payload[..4].copy_from_slice(&2u32.to_le_bytes());
        payload[8..12].copy_from_slice(&115_200u32.to_le_bytes());
        let bytes = raw(LB_TAG_SERIAL, 36, &payload);

        let (rec, _) = decode_record(&bytes, 0).unwrap();
        let Record::Serial(serial) = rec else {
            panic!("expected serial record, got {rec:?}");
        };
        assert_eq!(serial.kind, SerialType::MemoryMapped);
        assert_eq!(serial.baud, 115_200);
    }

    #[test]
    fn stream_rejects_slack_after_last_record() {
        let mut bytes = raw(LB_TAG_UNUSED, 8, &[]);
        bytes.extend_from_slice(&[0; 4]);

        let mut stream = RecordStream::new(&bytes);
        assert!(matches!(stream.next(), Some(Ok((0, Record::Unused { size: 8 })))));
        assert_eq!(stream.next(), Some(Err(LbError::TrailingBytes { offset: 8 })));
        assert_eq!(stream.next(), None);
    }

    #[test]
    fn stream_rejects_overrun_of_region() {
        let mut bytes = raw(LB_TAG_UNUSED, 8, &[]);
        bytes.extend_from_slice(&raw(LB_TAG_UNUSED, 16, &[0; 4]));

        let results: std::vec::Vec<_> = RecordStream::new(&bytes).collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1], Err(LbError::TrailingBytes { offset: 8 }));
    }

    #[cfg(feature = "builder")]
    #[test]
    fn encode_pads_unknown_payload() {
        let rec = Record::Unknown {
            tag: 0x77,
            size: 16,
            payload: &[9, 9, 9, 9, 9],
        };
        let bytes = encode_record(&rec).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[8..13], &[9; 5]);
        assert_eq!(&bytes[13..], &[0; 3]);
    }

    #[cfg(feature = "builder")]
    #[test]
    fn encode_rejects_malformed_records() {
        let known = Record::Unknown {
            tag: LB_TAG_MEMORY,
            size: 8,
            payload: &[],
        };
        assert_eq!(encode_record(&known), Err(LbError::InvalidRecord));

        let wrong_size = Record::Unknown {
            tag: 0x77,
            size: 8,
            payload: &[1, 2, 3, 4],
        };
        assert_eq!(encode_record(&wrong_size), Err(LbError::InvalidRecord));

        assert_eq!(
            encode_record(&Record::Unused { size: 6 }),
            Err(LbError::InvalidRecord)
        );
        assert_eq!(
            encode_record(&Record::Unused { size: 10 }),
            Err(LbError::InvalidRecord)
        );
    }

    #[cfg(feature = "builder")]
    #[test]
    fn serial_encodes_to_its_fixed_layout() {
        let serial = Serial {
            kind: SerialType::IoMapped,
            base_address: 0x3f8,
            baud: 115_200,
            register_width: 1,
            input_clock_hz: 1_843_200,
            uart_pci_address: 0,
        };
        let bytes = encode_record(&Record::Serial(serial)).unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_record(&bytes, 0), Ok((Record::Serial(serial), 32)));
    }
}
