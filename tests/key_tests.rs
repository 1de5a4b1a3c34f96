//! Tests for record headers and object resolution
//!
//! These tests verify:
//! - Header decoding for small and big offset versions
//! - Gap detection on short, garbage-filled input
//! - The compression signal and both payload load paths
//! - Resolution is done once and cached, even under concurrent callers
//! - Failures (unknown class, no decoder) leave the key retryable

use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rootio::{
    BufferError, Config, Factory, FileRef, Key, Marshaler, MemFile, ObjString, Object, RBuffer,
    RangeReader, Record, RecordBuilder, RootError, Unmarshaler, WBuffer, GAP_CLASS,
};

// =============================================================================
// Test Types
// =============================================================================

static COUNTED_DECODES: AtomicUsize = AtomicUsize::new(0);

/// Counts how many times it is decoded
#[derive(Debug, Default)]
struct Counted {
    value: u32,
}

impl Unmarshaler for Counted {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> rootio::Result<()> {
        COUNTED_DECODES.fetch_add(1, Ordering::SeqCst);
        self.value = r.read_u32();
        Ok(r.status()?)
    }
}

impl Marshaler for Counted {
    fn marshal_root(&self, w: &mut WBuffer) -> rootio::Result<()> {
        w.write_u32(self.value);
        Ok(w.status()?)
    }
}

impl Object for Counted {
    fn class(&self) -> &str {
        "Counted"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_unmarshaler(&mut self) -> Option<&mut dyn Unmarshaler> {
        Some(self)
    }

    fn as_marshaler(&self) -> Option<&dyn Marshaler> {
        Some(self)
    }
}

/// A class only known to some registries
#[derive(Debug, Default)]
struct Mystery {
    raw: u32,
}

impl Unmarshaler for Mystery {
    fn unmarshal_root(&mut self, r: &mut RBuffer) -> rootio::Result<()> {
        self.raw = r.read_u32();
        Ok(r.status()?)
    }
}

impl Object for Mystery {
    fn class(&self) -> &str {
        "TMystery"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_unmarshaler(&mut self) -> Option<&mut dyn Unmarshaler> {
        Some(self)
    }
}

/// Registered, but cannot decode itself
#[derive(Debug, Default)]
struct Opaque;

impl Object for Opaque {
    fn class(&self) -> &str {
        "TOpaque"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Lay records out at their offsets in an in-memory file
fn image(records: &[&Record]) -> FileRef {
    let end = records
        .iter()
        .map(|r| r.key.seek_key() as usize + r.data.len())
        .max()
        .unwrap_or(0);
    let mut buf = vec![0u8; end];
    for r in records {
        let at = r.key.seek_key() as usize;
        buf[at..at + r.data.len()].copy_from_slice(&r.data);
    }
    MemFile::new(buf).into_ref()
}

/// Decode a record's header back from the file it was placed in
fn attach(file: &FileRef, record: &Record) -> Key {
    let header = file
        .read_at(record.key.seek_key() as u64, record.key.key_len() as usize)
        .unwrap();
    Key::decode(&mut RBuffer::new(header, None, 0), Some(file.clone())).unwrap()
}

fn small_header() -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x30, // bytes = 48
        0x01, 0xF4, // version = 500
        0x00, 0x00, 0x00, 0x10, // objlen = 16
        0x00, 0x00, 0x00, 0x00, // datime
        0x00, 0x20, // keylen = 32
        0x00, 0x01, // cycle = 1
        0x00, 0x00, 0x01, 0x00, // seek_key = 256
        0x00, 0x00, 0x00, 0x64, // seek_pdir = 100
        0x01, b'A', 0x01, b'n', 0x01, b't',
    ]
}

fn big_header() -> Vec<u8> {
    vec![
        0x00, 0x00, 0x00, 0x38, // bytes = 56
        0x05, 0xDC, // version = 1500
        0x00, 0x00, 0x00, 0x64, // objlen = 100
        0x00, 0x00, 0x00, 0x00, // datime
        0x00, 0x28, // keylen = 40
        0x00, 0x02, // cycle = 2
        0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, // seek_key = 2^32
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64, // seek_pdir = 100
        0x01, b'A', 0x01, b'n', 0x01, b't',
    ]
}

// =============================================================================
// Header Decoding Tests
// =============================================================================

#[test]
fn test_decode_small_offsets() {
    let data = small_header();
    let mut r = RBuffer::new(data.clone(), None, 0);
    let key = Key::decode(&mut r, None).unwrap();

    assert_eq!(key.total_len(), 48);
    assert_eq!(key.version(), 500);
    assert_eq!(key.obj_len(), 16);
    assert_eq!(key.key_len(), 32);
    assert_eq!(key.cycle(), 1);
    assert_eq!(key.seek_key(), 256);
    assert_eq!(key.seek_pdir(), 100);
    assert_eq!(key.class(), "A");
    assert_eq!(key.name(), "n");
    assert_eq!(key.title(), "t");
    assert!(!key.is_gap());
    assert!(!key.is_compressed());
    assert_eq!(r.remaining(), 0);

    let mut w = WBuffer::new(None, 0);
    key.marshal_root(&mut w).unwrap();
    assert_eq!(w.as_slice(), &data[..]);
}

#[test]
fn test_decode_big_offsets() {
    let mut r = RBuffer::new(big_header(), None, 0);
    let key = Key::decode(&mut r, None).unwrap();

    assert_eq!(key.version(), 1500);
    assert_eq!(key.key_len(), 40);
    assert_eq!(key.cycle(), 2);
    assert_eq!(key.seek_key(), 1 << 32);
    assert_eq!(key.seek_pdir(), 100);
    assert_eq!(key.class(), "A");
    assert_eq!(key.title(), "t");
    assert_eq!(r.remaining(), 0);
}

#[test]
fn test_truncated_header_fails() {
    let mut data = small_header();
    data.truncate(20);
    let mut r = RBuffer::new(data, None, 0);
    let err = Key::decode(&mut r, None).unwrap_err();
    assert!(matches!(
        err,
        RootError::Buffer(BufferError::ShortBuffer { .. })
    ));
}

// =============================================================================
// Gap Tests
// =============================================================================

#[test]
fn test_gap_stops_after_length() {
    // -100 followed by one stray byte: far too short for a header.
    let mut r = RBuffer::new(vec![0xFF, 0xFF, 0xFF, 0x9C, 0xAB], None, 0);
    let key = Key::decode(&mut r, None).unwrap();

    assert!(key.is_gap());
    assert_eq!(key.class(), GAP_CLASS);
    assert_eq!(key.gap_len(), Some(100));
    assert_eq!(key.total_len(), -100);
    assert!(r.err().is_none());
    assert_eq!(r.remaining(), 1);
}

#[test]
fn test_gap_with_exactly_four_bytes() {
    let mut r = RBuffer::new(vec![0xFF, 0xFF, 0xFF, 0xF0], None, 0);
    let key = Key::decode(&mut r, None).unwrap();
    assert_eq!(key.gap_len(), Some(16));
}

#[test]
fn test_gap_object_is_an_error() {
    let key = Key::gap(500, 64);
    assert!(matches!(key.object(), Err(RootError::GapRecord { offset: 500 })));
    assert!(!key.is_resolved());
}

#[test]
fn test_gap_encodes_length_only() {
    let mut w = WBuffer::new(None, 0);
    Key::gap(0, 32).marshal_root(&mut w).unwrap();
    assert_eq!(w.as_slice(), &(-32i32).to_be_bytes());
}

// =============================================================================
// Compression Tests
// =============================================================================

#[test]
fn test_compression_signal_from_lengths() {
    let small = Key::decode(&mut RBuffer::new(small_header(), None, 0), None).unwrap();
    let big = Key::decode(&mut RBuffer::new(big_header(), None, 0), None).unwrap();
    assert!(!small.is_compressed());
    assert!(big.is_compressed());
}

#[test]
fn test_uncompressed_and_compressed_records_decode_identically() {
    let value = "payload ".repeat(100);
    let plain = RecordBuilder::new("TObjString", "plain")
        .compression_level(0)
        .build_object(100, &ObjString::new(value.clone()))
        .unwrap();
    let packed = RecordBuilder::new("TObjString", "packed")
        .build_object(100 + plain.data.len() as i64, &ObjString::new(value.clone()))
        .unwrap();
    assert!(!plain.key.is_compressed());
    assert!(packed.key.is_compressed());
    assert!(packed.data.len() < plain.data.len());

    let file = image(&[&plain, &packed]);
    let a = attach(&file, &plain);
    let b = attach(&file, &packed);
    assert!(!a.is_compressed());
    assert!(b.is_compressed());
    assert_eq!(a.payload().unwrap(), b.payload().unwrap());

    for key in [&a, &b] {
        let obj = key.object().unwrap();
        assert_eq!(obj.downcast_ref::<ObjString>().unwrap().as_str(), value);
    }
}

#[test]
fn test_small_payload_is_stored_raw() {
    let record = RecordBuilder::new("TObjString", "tiny")
        .build_object(100, &ObjString::new("hi"))
        .unwrap();
    assert!(!record.key.is_compressed());
}

#[test]
fn test_corrupt_compressed_stream() {
    let mut packed = RecordBuilder::new("TObjString", "packed")
        .build_object(100, &ObjString::new("x".repeat(1000)))
        .unwrap();
    // Break the zlib stream header right after the 9-byte sub-header.
    let stream = packed.key.key_len() as usize + 9;
    packed.data[stream] = 0xFF;
    packed.data[stream + 1] = 0xFF;

    let file = image(&[&packed]);
    let key = attach(&file, &packed);
    assert!(matches!(key.payload(), Err(RootError::Decompress(_))));
    assert!(key.object().is_err());
    assert!(!key.is_resolved());
}

#[test]
fn test_compression_header_check_is_optional() {
    let mut packed = RecordBuilder::new("TObjString", "packed")
        .build_object(100, &ObjString::new("y".repeat(1000)))
        .unwrap();
    let tag = packed.key.key_len() as usize;
    packed.data[tag] = b'X';
    packed.data[tag + 1] = b'X';

    let file = image(&[&packed]);
    let key = attach(&file, &packed);

    // Skipped by default.
    assert_eq!(key.load(&Config::default()).unwrap().len(), key.obj_len() as usize);

    let strict = Config::builder().verify_compression_header(true).build();
    assert!(matches!(key.load(&strict), Err(RootError::Decompress(_))));
}

#[test]
fn test_object_length_limit() {
    let record = RecordBuilder::new("TObjString", "s")
        .build_object(100, &ObjString::new("z".repeat(100)))
        .unwrap();
    let file = image(&[&record]);
    let key = attach(&file, &record);

    let tight = Config::builder().max_object_len(16).build();
    assert!(matches!(key.load(&tight), Err(RootError::Malformed(_))));
}

#[test]
fn test_detached_key_cannot_load() {
    let record = RecordBuilder::new("TObjString", "s")
        .build_object(100, &ObjString::new("detached"))
        .unwrap();
    assert!(matches!(record.key.payload(), Err(RootError::Malformed(_))));
}

#[test]
fn test_record_past_end_of_file() {
    let record = RecordBuilder::new("TObjString", "s")
        .build_object(100, &ObjString::new("cut"))
        .unwrap();
    let mut data = vec![0u8; 100];
    data.extend_from_slice(&record.data[..record.data.len() - 2]);
    let file = MemFile::new(data).into_ref();
    let key = attach(&file, &record);
    assert!(matches!(key.payload(), Err(RootError::ShortRead { .. })));
}

// =============================================================================
// Builder Tests
// =============================================================================

#[test]
fn test_builder_header_fields() {
    let record = RecordBuilder::new("TObjString", "name")
        .title("a title")
        .cycle(3)
        .directory_offset(100)
        .build_object(400, &ObjString::new("v"))
        .unwrap();

    let key = &record.key;
    assert_eq!(key.total_len() as usize, record.data.len());
    assert_eq!(key.key_len() as usize, RecordBuilder::new("TObjString", "name").title("a title").key_len());
    assert_eq!(key.cycle(), 3);
    assert_eq!(key.seek_key(), 400);
    assert_eq!(key.seek_pdir(), 100);
    assert_eq!(key.title(), "a title");
}

#[test]
fn test_builder_title_defaults_to_name() {
    let record = RecordBuilder::new("TObjString", "alone")
        .build(100, &[0u8; 4])
        .unwrap();
    assert_eq!(record.key.title(), "alone");
}

#[test]
fn test_builder_offsets_need_big_version() {
    let far = 1i64 << 33;
    let small = RecordBuilder::new("TObjString", "far").build(far, &[0u8; 4]);
    assert!(matches!(small, Err(RootError::Malformed(_))));

    let big = RecordBuilder::new("TObjString", "far")
        .big_file()
        .build(far, &[0u8; 4])
        .unwrap();
    assert!(big.key.version() > 1000);
    assert_eq!(big.key.seek_key(), far);

    let mut r = RBuffer::new(big.data[..big.key.key_len() as usize].to_vec(), None, 0);
    let decoded = Key::decode(&mut r, None).unwrap();
    assert_eq!(decoded.seek_key(), far);
}

// =============================================================================
// Resolution Tests
// =============================================================================

#[test]
fn test_resolution_happens_once() {
    let factory = Factory::with_builtins();
    factory.register("Counted", || Box::new(Counted::default()));
    let config = Config::default();

    let first = RecordBuilder::new("Counted", "one")
        .build_object(100, &Counted { value: 7 })
        .unwrap();
    let second = RecordBuilder::new("Counted", "two")
        .build_object(200, &Counted { value: 9 })
        .unwrap();
    let file = image(&[&first, &second]);

    let key = attach(&file, &first);
    assert!(!key.is_resolved());
    let a = key.object_with(&factory, &config).unwrap();
    let b = key.object_with(&factory, &config).unwrap();
    assert!(key.is_resolved());
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.downcast_ref::<Counted>().unwrap().value, 7);
    assert_eq!(COUNTED_DECODES.load(Ordering::SeqCst), 1);

    // Concurrent first resolution of another key still decodes once.
    let shared = attach(&file, &second);
    let (shared, factory, config) = (&shared, &factory, &config);
    let results: Vec<Arc<dyn Object>> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(move || shared.object_with(factory, config).unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for obj in &results {
        assert!(Arc::ptr_eq(obj, &results[0]));
    }
    assert_eq!(results[0].downcast_ref::<Counted>().unwrap().value, 9);
    assert_eq!(COUNTED_DECODES.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unknown_class_is_retryable() {
    let mystery = RecordBuilder::new("TMystery", "odd")
        .build(100, &0xDEAD_BEEFu32.to_be_bytes())
        .unwrap();
    let sibling = RecordBuilder::new("TObjString", "fine")
        .build_object(200, &ObjString::new("still here"))
        .unwrap();
    let file = image(&[&mystery, &sibling]);

    let odd = attach(&file, &mystery);
    match odd.object() {
        Err(RootError::UnknownClass { class, key }) => {
            assert_eq!(class, "TMystery");
            assert_eq!(key, "odd");
        }
        other => panic!("expected UnknownClass, got {:?}", other),
    }
    assert!(!odd.is_resolved());

    // The failure does not disturb other records.
    let fine = attach(&file, &sibling);
    let obj = fine.object().unwrap();
    assert_eq!(obj.downcast_ref::<ObjString>().unwrap().as_str(), "still here");

    // Retry once the class is known.
    let factory = Factory::with_builtins();
    factory.register("TMystery", || Box::new(Mystery::default()));
    let obj = odd.object_with(&factory, &Config::default()).unwrap();
    assert_eq!(obj.downcast_ref::<Mystery>().unwrap().raw, 0xDEAD_BEEF);
    assert!(odd.is_resolved());
}

#[test]
fn test_class_without_decoder() {
    let factory = Factory::new();
    factory.register("TOpaque", || Box::new(Opaque));

    let record = RecordBuilder::new("TOpaque", "blob")
        .build(100, &[1, 2, 3, 4])
        .unwrap();
    let file = image(&[&record]);
    let key = attach(&file, &record);

    let err = key.object_with(&factory, &Config::default()).unwrap_err();
    assert!(matches!(err, RootError::NotUnmarshaler { ref class, .. } if class == "TOpaque"));
    assert!(!key.is_resolved());
}

#[test]
fn test_resolved_key_is_file_aware() {
    // A record holding a key header resolves into a key bound to the same file.
    let inner = RecordBuilder::new("TObjString", "inner")
        .build_object(300, &ObjString::new("deep"))
        .unwrap();
    let outer = RecordBuilder::new("TKey", "outer")
        .build_object(100, &inner.key)
        .unwrap();
    let file = image(&[&outer, &inner]);

    let key = attach(&file, &outer);
    let obj = key.object().unwrap();
    let nested = obj.downcast_ref::<Key>().unwrap();
    assert!(nested.file().is_some());
    let value = nested.object().unwrap();
    assert_eq!(value.downcast_ref::<ObjString>().unwrap().as_str(), "deep");
}

#[test]
fn test_empty_string_object_resolves() {
    let record = RecordBuilder::new("TObjString", "empty")
        .build_object(100, &ObjString::new(""))
        .unwrap();
    let file = image(&[&record]);
    let key = attach(&file, &record);

    let obj = key.object().unwrap();
    assert_eq!(obj.downcast_ref::<ObjString>().unwrap().as_str(), "");
}

#[test]
fn test_compression_signal_on_hostile_lengths() {
    let mut data = small_header();
    data[..4].copy_from_slice(&i32::MAX.to_be_bytes());
    data[14..16].copy_from_slice(&(-1i16).to_be_bytes());

    let key = Key::decode(&mut RBuffer::new(data, None, 0), None).unwrap();
    assert_eq!(key.key_len(), -1);
    assert!(key.is_compressed());
}
