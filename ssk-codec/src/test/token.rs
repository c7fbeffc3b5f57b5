use crate::bitcur::{BitReader, BitWriter};
use crate::cdu::{self, Subtype};
use crate::token::{self, DecodeOpts, TAG_RAW, TAG_RESERVED};
use ssk_base::ErrorKind;
use test_log::test;

const STRICT: DecodeOpts = DecodeOpts {
    cdu_minimal: true,
    token_bounds: true,
};

fn round_trip(chunks: &[(u64, u32)]) -> Vec<(u64, bool)> {
    let mut wr = BitWriter::new();
    token::write_tokens(&mut wr, chunks.len() as u32, |i| {
        let (block, width) = chunks[i as usize];
        (block, width, block.count_ones() > 18)
    })
    .unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let mut out = Vec::new();
    token::read_tokens(
        &mut rd,
        chunks.len() as u32,
        |i| chunks[i as usize].1,
        &mut |i, block, raw| {
            assert_eq!(i as usize, out.len());
            out.push((block, raw));
            Ok(())
        },
        STRICT,
    )
    .unwrap();
    out
}

#[test]
fn test_enum_chunks_individually() {
    let sparse = 1u64 << 63 | 1 << 40 | 1 << 1;
    let out = round_trip(&[(sparse, 64), (0, 64), (1 << 63, 7)]);
    assert_eq!(out, vec![(sparse, false), (0, false), (1 << 63, false)]);
}

#[test]
fn test_isolated_raw_chunk() {
    let dense = u64::MAX ^ 0xff;
    let out = round_trip(&[(0, 64), (dense, 64), (1 << 63, 64)]);
    assert_eq!(out[1], (dense, true));
}

#[test]
fn test_raw_run_coalescing() {
    // three dense chunks and a short dense tail must ride one RAW_RUN
    let dense = u64::MAX;
    let short = u64::MAX << 34; // 30-bit tail, popcount 30 > 18
    let chunks = [(dense, 64), (!0x1234u64, 64), (dense, 64), (short, 30)];
    let mut wr = BitWriter::new();
    token::write_tokens(&mut wr, 4, |i| {
        let (b, w) = chunks[i as usize];
        (b, w, true)
    })
    .unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    // one RAW_RUN: 2-bit tag + run_len 4 (SMALL_INT, 4 bits) + 64*3+30 bits
    assert_eq!(bytes.len(), (2 + 4 + 222 + 7) / 8);
    let mut rd = BitReader::new(&bytes);
    let mut got = Vec::new();
    token::read_tokens(
        &mut rd,
        4,
        |i| chunks[i as usize].1,
        &mut |_, b, raw| {
            got.push((b, raw));
            Ok(())
        },
        STRICT,
    )
    .unwrap();
    let want: Vec<(u64, bool)> = chunks.iter().map(|&(b, _)| (b, true)).collect();
    assert_eq!(got, want);
}

#[test]
fn test_adjacent_raw_tokens_rejected() {
    let mut wr = BitWriter::new();
    for _ in 0..2 {
        cdu::encode(&mut wr, Subtype::Raw2, TAG_RAW).unwrap();
        cdu::encode(&mut wr, Subtype::Raw64, u64::MAX).unwrap();
    }
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 2, |_| 64, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NonCanonical));
}

#[test]
fn test_run_of_one_rejected() {
    let mut wr = BitWriter::new();
    cdu::encode(&mut wr, Subtype::Raw2, token::TAG_RAW_RUN).unwrap();
    cdu::encode(&mut wr, Subtype::SmallInt, 1).unwrap();
    cdu::encode(&mut wr, Subtype::Raw64, u64::MAX).unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 2, |_| 64, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NonCanonical));
}

#[test]
fn test_reserved_tag_rejected() {
    let mut wr = BitWriter::new();
    cdu::encode(&mut wr, Subtype::Raw2, TAG_RESERVED).unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 1, |_| 64, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Reserved));
}

#[test]
fn test_enum_k_over_chunk_width() {
    // k = 5 in a 3-bit chunk is structurally impossible
    let mut wr = BitWriter::new();
    cdu::encode(&mut wr, Subtype::Raw2, token::TAG_ENUM).unwrap();
    cdu::encode(&mut wr, Subtype::EnumK, 5).unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 1, |_| 3, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::OutOfRange));
}

#[test]
fn test_enum_rank_bound() {
    // n=64, k=2: C = 2016 in an 11-bit field; 2047 is out of range
    let mut wr = BitWriter::new();
    cdu::encode(&mut wr, Subtype::Raw2, token::TAG_ENUM).unwrap();
    cdu::encode(&mut wr, Subtype::EnumK, 2).unwrap();
    wr.write(2047, 11);
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 1, |_| 64, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::OutOfRange));
    // with bounds checking off it still decodes deterministically
    let mut rd = BitReader::new(&bytes);
    let lenient = DecodeOpts {
        cdu_minimal: false,
        token_bounds: false,
    };
    token::read_tokens(&mut rd, 1, |_| 64, &mut |_, _, _| Ok(()), lenient).unwrap();
}

#[test]
fn test_raw_with_enum_popcount_rejected() {
    let mut wr = BitWriter::new();
    cdu::encode(&mut wr, Subtype::Raw2, TAG_RAW).unwrap();
    cdu::encode(&mut wr, Subtype::Raw64, 0b101).unwrap();
    wr.pad_to_byte();
    let bytes = wr.into_bytes();
    let mut rd = BitReader::new(&bytes);
    let err = token::read_tokens(&mut rd, 1, |_| 64, &mut |_, _, _| Ok(()), STRICT).unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::NonCanonical));
}
