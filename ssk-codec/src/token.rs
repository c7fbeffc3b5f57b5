// Chunk tokens: the on-wire unit for one chunk of a MIX segment, or for a
// coalesced run of RAW chunks. Canonical streams emit every maximal run of
// two or more RAW-classified chunks as exactly one RAW_RUN, so the decoder
// treats a RAW-family token directly after another as a violation.

use crate::bitcur::{BitReader, BitWriter};
use crate::cdu::{self, Subtype};
use crate::combin;
use crate::K_CHUNK_ENUM_MAX;
use ssk_base::{codec_err, ErrorKind, Result};

pub(crate) const TAG_ENUM: u64 = 0b00;
pub(crate) const TAG_RAW: u64 = 0b01;
pub(crate) const TAG_RAW_RUN: u64 = 0b10;
pub(crate) const TAG_RESERVED: u64 = 0b11;

/// Validation knobs threaded down from the Format 0 decoder.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DecodeOpts {
    pub(crate) cdu_minimal: bool,
    pub(crate) token_bounds: bool,
}

fn write_raw_payload(wr: &mut BitWriter, block: u64, width: u32) -> Result<()> {
    if width == 64 {
        cdu::encode(wr, Subtype::Raw64, block)?;
    } else {
        wr.write(block >> (64 - width), width);
    }
    Ok(())
}

fn read_raw_payload(rd: &mut BitReader, width: u32) -> Result<u64> {
    if width == 64 {
        Ok(cdu::decode(rd, Subtype::Raw64)?.0)
    } else {
        Ok(rd.read(width)? << (64 - width))
    }
}

/// Emit the token stream for one segment's chunks. `chunk(i)` yields the
/// block word, the chunk width in bits, and whether the chunk is
/// RAW-classified.
pub(crate) fn write_tokens(
    wr: &mut BitWriter,
    n_chunks: u32,
    chunk: impl Fn(u32) -> (u64, u32, bool),
) -> Result<()> {
    let mut i = 0;
    while i < n_chunks {
        let at = wr.pos();
        let (block, width, raw) = chunk(i);
        if raw {
            let mut j = i + 1;
            while j < n_chunks && chunk(j).2 {
                j += 1;
            }
            if j - i >= 2 {
                cdu::encode(wr, Subtype::Raw2, TAG_RAW_RUN)?;
                cdu::encode(wr, Subtype::SmallInt, (j - i) as u64)?;
                for c in i..j {
                    let (block, width, _) = chunk(c);
                    write_raw_payload(wr, block, width)?;
                }
                wr.note("raw_run", at);
                i = j;
            } else {
                cdu::encode(wr, Subtype::Raw2, TAG_RAW)?;
                write_raw_payload(wr, block, width)?;
                wr.note("raw", at);
                i += 1;
            }
        } else {
            cdu::encode(wr, Subtype::Raw2, TAG_ENUM)?;
            let k = block.count_ones();
            cdu::encode(wr, Subtype::EnumK, k as u64)?;
            let rank_bits = combin::rank_width(width, k);
            if rank_bits > 0 {
                wr.write(combin::enum_rank(block, width), rank_bits);
            }
            wr.note("enum", at);
            i += 1;
        }
    }
    Ok(())
}

/// Decode one segment's token stream. `width(i)` yields chunk widths;
/// `sink(i, block, raw)` receives each decoded chunk in order.
pub(crate) fn read_tokens(
    rd: &mut BitReader,
    n_chunks: u32,
    width: impl Fn(u32) -> u32,
    sink: &mut impl FnMut(u32, u64, bool) -> Result<()>,
    opts: DecodeOpts,
) -> Result<()> {
    let mut i = 0;
    let mut prev_was_raw = false;
    while i < n_chunks {
        let (tag, _) = cdu::decode(rd, Subtype::Raw2)?;
        match tag {
            TAG_ENUM => {
                let (k, _) = cdu::decode_opt(rd, Subtype::EnumK, opts.cdu_minimal)?;
                let w = width(i);
                let k = k as u32;
                if k > w.min(K_CHUNK_ENUM_MAX) {
                    return Err(codec_err(ErrorKind::OutOfRange, "enum k exceeds chunk bounds"));
                }
                let rank_bits = combin::rank_width(w, k);
                let rank = if rank_bits > 0 { rd.read(rank_bits)? } else { 0 };
                if opts.token_bounds && rank >= combin::choose(w, k) {
                    return Err(codec_err(ErrorKind::OutOfRange, "enum rank >= C(n,k)"));
                }
                sink(i, combin::enum_unrank(rank, w, k), false)?;
                prev_was_raw = false;
                i += 1;
            }
            TAG_RAW => {
                if prev_was_raw {
                    return Err(codec_err(
                        ErrorKind::NonCanonical,
                        "raw token adjacent to raw token",
                    ));
                }
                let w = width(i);
                let block = read_raw_payload(rd, w)?;
                check_raw_popcount(block, opts)?;
                sink(i, block, true)?;
                prev_was_raw = true;
                i += 1;
            }
            TAG_RAW_RUN => {
                if prev_was_raw {
                    return Err(codec_err(
                        ErrorKind::NonCanonical,
                        "raw run adjacent to raw token",
                    ));
                }
                let (run_len, _) = cdu::decode_opt(rd, Subtype::SmallInt, opts.cdu_minimal)?;
                if run_len < 2 {
                    return Err(codec_err(ErrorKind::NonCanonical, "raw run shorter than 2"));
                }
                if run_len > (n_chunks - i) as u64 {
                    return Err(codec_err(ErrorKind::OutOfRange, "raw run exceeds segment"));
                }
                for _ in 0..run_len {
                    let w = width(i);
                    let block = read_raw_payload(rd, w)?;
                    check_raw_popcount(block, opts)?;
                    sink(i, block, true)?;
                    i += 1;
                }
                prev_was_raw = true;
            }
            TAG_RESERVED => {
                return Err(codec_err(ErrorKind::Reserved, "reserved token tag"));
            }
            _ => unreachable!(),
        }
    }
    Ok(())
}

fn check_raw_popcount(block: u64, opts: DecodeOpts) -> Result<()> {
    if opts.token_bounds && combin::should_use_enum(block.count_ones()) {
        return Err(codec_err(
            ErrorKind::NonCanonical,
            "raw chunk with enum-range popcount",
        ));
    }
    Ok(())
}
