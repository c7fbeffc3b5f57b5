use crate::abv::Abv;
use crate::build::Builder;
use crate::{FORMAT_VERSION, K_CHUNK_ENUM_MAX};
use ssk_base::ErrorKind;
use test_log::test;

#[test]
fn test_new_rejects_unknown_version() {
    let err = Abv::new(3, 0).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::UnsupportedVersion));
}

#[test]
fn test_empty_abv() {
    let abv = Builder::new(Abv::new(FORMAT_VERSION, 0).unwrap())
        .unwrap()
        .finish();
    assert_eq!(abv.cardinality(), 0);
    assert!(abv.is_empty());
    assert_eq!(abv.root_rare_bit(), 1);
    assert!(!abv.contains(0));
    assert!(!abv.contains(u64::MAX));
    assert_eq!(abv.iter().next(), None);
}

// Start tiny so every append crosses a grow/relocate boundary.
#[test]
fn test_growth_and_offset_array_doubling() {
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 1).unwrap()).unwrap();
    for pid in 0..13u32 {
        let mut pb = bld.begin_partition(pid * 3, 1).unwrap();
        pb.add_rle_segment(100, 200).unwrap();
        bld = pb.finalize_partition().unwrap();
    }
    let abv = bld.finish();
    assert_eq!(abv.cardinality(), 13 * 200);
    for pid in 0..13u64 {
        assert!(abv.contains((pid * 3) << 32 | 150));
        assert!(!abv.contains((pid * 3) << 32 | 99));
        assert!(!abv.contains(((pid * 3) as u64) << 32 | 300));
    }
    assert!(!abv.contains(1u64 << 32));
}

#[test]
fn test_segment_offset_array_doubling() {
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 1).unwrap()).unwrap();
    let mut pb = bld.begin_partition(7, 1).unwrap();
    for i in 0..11u32 {
        pb.add_rle_segment(i * 1000, 100).unwrap();
    }
    bld = pb.finalize_partition().unwrap();
    let abv = bld.finish();
    assert_eq!(abv.cardinality(), 1100);
    assert!(abv.contains(7u64 << 32 | 10_050));
    assert!(!abv.contains(7u64 << 32 | 10_150));
}

#[test]
fn test_chunk_metadata_gap_widens() {
    // 300 chunks outgrow the initial 256-chunk metadata reservation
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 1).unwrap()).unwrap();
    let pb = bld.begin_partition(0, 1).unwrap();
    let mut sb = pb.begin_mix_segment(0).unwrap();
    for i in 0..300u64 {
        // one set bit per chunk, marching through the word
        sb.append_chunk(1u64 << (63 - (i % 64)), 64).unwrap();
    }
    bld = sb.finalize_segment().unwrap().finalize_partition().unwrap();
    let abv = bld.finish();
    assert_eq!(abv.cardinality(), 300);
    for i in 0..300u64 {
        assert!(abv.contains(i * 64 + (i % 64)), "chunk {}", i);
    }
    let members: Vec<u64> = abv.iter().collect();
    assert_eq!(members.len(), 300);
    assert_eq!(members[0], 0);
    assert_eq!(members[1], 65);
}

#[test]
fn test_chunk_classification_boundary() {
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let pb = bld.begin_partition(0, 1).unwrap();
    let mut sb = pb.begin_mix_segment(0).unwrap();
    let k18 = u64::MAX << (64 - K_CHUNK_ENUM_MAX);
    let k19 = u64::MAX << (64 - K_CHUNK_ENUM_MAX - 1);
    sb.append_chunk(k18, 64).unwrap();
    sb.append_chunk(k19, 64).unwrap();
    bld = sb.finalize_segment().unwrap().finalize_partition().unwrap();
    let abv = bld.finish();
    let p = abv.part(0);
    let s = abv.seg(p, 0);
    assert_eq!(abv.seg_meta(s, 0), (false, false)); // enum, clean
    assert_eq!(abv.seg_meta(s, 1), (true, false)); // raw, clean
    assert_eq!(abv.seg_card(s), 18 + 19);
}

#[test]
fn test_dense_partition_cardinality() {
    // rare_bit = 0: gaps and RLE runs are dominant-one territory
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let mut pb = bld.begin_partition(0, 0).unwrap();
    // one run of 100 rare zeros at bit 1000
    pb.add_rle_segment(1000, 100).unwrap();
    bld = pb.finalize_partition().unwrap();
    let abv = bld.finish();
    assert_eq!(abv.cardinality(), (1u64 << 32) - 100);
    assert!(abv.contains(0));
    assert!(abv.contains(999));
    assert!(!abv.contains(1000));
    assert!(!abv.contains(1099));
    assert!(abv.contains(1100));
    // absent partitions stay empty: the root fill is sparse
    assert!(!abv.contains(1u64 << 32));
}

#[test]
fn test_full_partition() {
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let pb = bld.begin_partition(5, 0).unwrap();
    bld = pb.finalize_partition().unwrap();
    let abv = bld.finish();
    assert_eq!(abv.cardinality(), 1u64 << 32);
    assert!(abv.contains(5u64 << 32));
    assert!(abv.contains(5u64 << 32 | 0xffff_ffff));
    assert!(!abv.contains(4u64 << 32));
    assert_eq!(abv.iter().next(), Some(5u64 << 32));
}

#[test]
fn test_empty_partition_matching_root_fill_rejected() {
    let bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let pb = bld.begin_partition(0, 1).unwrap();
    let err = pb.finalize_partition().unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NonCanonical));
}

#[test]
fn test_builder_ordering_enforced() {
    let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let mut pb = bld.begin_partition(3, 1).unwrap();
    pb.add_rle_segment(0, 100).unwrap();
    let err = pb.add_rle_segment(50, 100).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NonCanonical));
    bld = pb.finalize_partition().unwrap();
    assert!(bld.begin_partition(3, 1).is_err());
}

#[test]
fn test_segment_extent_checked() {
    let bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let mut pb = bld.begin_partition(0, 1).unwrap();
    let err = pb.add_rle_segment(u32::MAX, 2).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::OutOfRange));
}

#[test]
fn test_short_chunk_must_be_last() {
    let bld = Builder::new(Abv::new(FORMAT_VERSION, 64).unwrap()).unwrap();
    let pb = bld.begin_partition(0, 1).unwrap();
    let mut sb = pb.begin_mix_segment(0).unwrap();
    sb.append_chunk(1 << 63, 10).unwrap();
    assert!(sb.append_chunk(1 << 63, 64).is_err());
}

#[test]
fn test_grow_is_stable() {
    let mut abv = Abv::new(FORMAT_VERSION, 32).unwrap();
    abv.grow(1 << 16).unwrap();
    abv.grow(1).unwrap(); // no-op, space already free
    assert_eq!(abv.format_version(), FORMAT_VERSION);
    assert_eq!(abv.root_rare_bit(), 1);
}

#[test]
fn test_structural_equality() {
    let a = Abv::from_members([1u64, 99, 1 << 40]).unwrap();
    let b = Abv::from_members([1u64, 99, 1 << 40]).unwrap();
    let c = Abv::from_members([1u64, 98, 1 << 40]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
    // equality ignores allocation shape
    let mut d = a.clone();
    d.grow(4096).unwrap();
    assert_eq!(a, d);
}
