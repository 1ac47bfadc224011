use lbio_abi::builder::{TableBuilder, build};
use lbio_abi::memory::{MemoryMap, MemoryRange, MemoryType};
use lbio_abi::phys::SliceMemory;
use lbio_abi::reader::Table;
use lbio_abi::record::{Record, Serial, SerialType};
use lbio_abi::{HEADER_SIZE, Header};

const BASE: u64 = 0x0050_0000;

fn com1() -> Serial {
    Serial {
        kind: SerialType::IoMapped,
        base_address: 0x3f8,
        baud: 115_200,
        register_width: 1,
        input_clock_hz: 1_843_200,
        uart_pci_address: 0,
    }
}

#[test]
fn memory_map_example_round_trips() {
    let ranges = [
        MemoryRange::new(0, 0x9_f000, MemoryType::Ram),
        MemoryRange::new(0x10_0000, 0x1ff0_0000, MemoryType::Ram),
    ];
    let blob = build(&[Record::Memory(MemoryMap::from_ranges(&ranges))]).unwrap();

    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();
    let map = table.memory_map().unwrap();

    assert_eq!(map.len(), 2);
    let decoded: Vec<_> = map.iter().collect();
    assert_eq!(decoded, ranges);
    assert!(decoded.iter().all(MemoryRange::is_usable));
    assert_eq!(decoded[1].end(), 0x2000_0000);
}

#[test]
fn records_come_back_in_order() {
    let ranges = [
        MemoryRange::new(0, 0x1000, MemoryType::Reserved),
        MemoryRange::new(0x1000, 0x9_e000, MemoryType::Ram),
        MemoryRange::new(0xe_0000, 0x2_0000, MemoryType::Table),
        MemoryRange::new(0xfec0_0000, 0x1000, MemoryType::Other(0x20)),
    ];
    let unknown = [0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4];
    let records = [
        Record::Unused { size: 16 },
        Record::Memory(MemoryMap::from_ranges(&ranges)),
        Record::Serial(com1()),
        Record::Unknown {
            tag: 0x0024,
            size: 16,
            payload: &unknown,
        },
        Record::Memory(MemoryMap::from_ranges(&[])),
    ];

    let blob = build(&records).unwrap();
    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();

    let decoded: Vec<_> = table.records().collect();
    assert_eq!(decoded, records);
    assert_eq!(table.len(), records.len());
    assert_eq!(table.serial(), Some(com1()));
}

#[test]
fn records_can_be_iterated_again() {
    let blob = build(&[Record::Serial(com1()), Record::Unused { size: 8 }]).unwrap();
    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();

    let first: Vec<_> = table.records().collect();
    let second: Vec<_> = table.records().collect();
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[test]
fn empty_table_has_no_records() {
    let blob = TableBuilder::new().finish().unwrap();
    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();

    assert!(table.is_empty());
    assert_eq!(table.memory_map(), None);
    assert_eq!(table.header().table_bytes, 0);
    assert_eq!(table.address(), BASE);
}

#[test]
fn unknown_tag_does_not_stop_iteration() {
    let ranges = [MemoryRange::new(0, 0xa_0000, MemoryType::Ram)];
    let payload = [7u8; 12];
    let blob = build(&[
        Record::Memory(MemoryMap::from_ranges(&ranges)),
        Record::Unknown {
            tag: 0xc0de,
            size: 20,
            payload: &payload,
        },
        Record::Serial(com1()),
    ])
    .unwrap();

    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();
    let mut records = table.records();

    assert!(matches!(records.next(), Some(Record::Memory(_))));
    assert!(matches!(
        records.next(),
        Some(Record::Unknown {
            tag: 0xc0de,
            size: 20,
            ..
        })
    ));
    assert_eq!(records.next(), Some(Record::Serial(com1())));
    assert_eq!(records.next(), None);
}

#[test]
fn table_entries_is_advisory() {
    let mut blob = build(&[Record::Serial(com1()), Record::Unused { size: 8 }]).unwrap();

    // Reseal the header with a bogus entry count.
    let hdr = Header::for_table(&blob[HEADER_SIZE..], 0).unwrap();
    blob[..HEADER_SIZE].copy_from_slice(&hdr.to_bytes());

    let mem = SliceMemory::new(BASE, &blob);
    let table = Table::open(&mem, BASE).unwrap();
    assert_eq!(table.header().table_entries, 0);
    assert_eq!(table.len(), 2);
}

#[test]
fn builder_counts_entries() {
    let mut builder = TableBuilder::new();
    builder
        .push(&Record::Serial(com1()))
        .unwrap()
        .push(&Record::Unused { size: 8 })
        .unwrap();
    assert_eq!(builder.len(), 2);

    let blob = builder.finish().unwrap();
    let hdr = Header::parse(&blob).unwrap();
    assert_eq!(hdr.table_entries, 2);
    assert_eq!(hdr.table_bytes, 40);
}
