// Format 0: the wire form. One packed bit stream: an 8-bit version, the
// partition count, the root dominant bit, then per partition its id delta,
// segment count and dominant bit, then per segment its start delta, length,
// kind tag and (for MIX) the token stream, then zero padding to the byte
// boundary. Deltas use the previous record's end, so ordering is built into
// the arithmetic; the 1-bit header fields store the dominant bit so the
// empty set is the all-zero two-byte stream.

use crate::abv::{Abv, PARTITION_BITS, SEG_MIX, SEG_RLE};
use crate::bitcur::{BitReader, BitWriter};
use crate::build::Builder;
use crate::cdu::{self, Subtype};
use crate::token::{self, DecodeOpts};
use crate::{DOMINANT_RUN_THRESHOLD, FORMAT_VERSION, RARE_RUN_THRESHOLD};
use ssk_base::{codec_err, ErrorKind, Result};

bitflags::bitflags! {
    /// Selects which canonicality checks the decoder runs beyond the
    /// always-on structural ones.
    pub struct ValidateFlags: u32 {
        /// Every CDU field is minimally encoded.
        const CDU_MINIMAL = 0b00001;
        /// Partition ids and segment start bits strictly increase.
        const ORDERING = 0b00010;
        /// Each MIX segment's rare bit complements its dominant bit.
        const RARE_BIT = 0b00100;
        /// RLE and implicit-run lengths respect the thresholds.
        const THRESHOLD = 0b01000;
        /// ENUM ranks are in range and chunk classification is canonical.
        const TOKEN_BOUNDS = 0b10000;
        const ALL = Self::CDU_MINIMAL.bits
            | Self::ORDERING.bits
            | Self::RARE_BIT.bits
            | Self::THRESHOLD.bits
            | Self::TOKEN_BOUNDS.bits;
    }
}

impl Abv {
    /// Encode a finalized, clean AbV to its canonical byte string.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut wr = BitWriter::new();
        encode_into(self, &mut wr)?;
        Ok(wr.into_bytes())
    }

    /// Parse a Format 0 byte string, validating under `flags`.
    pub fn decode(bytes: &[u8], flags: ValidateFlags) -> Result<Abv> {
        let abv = parse(bytes, flags)?;
        validate(&abv, flags)?;
        Ok(abv)
    }
}

pub(crate) fn encode_into(abv: &Abv, wr: &mut BitWriter) -> Result<()> {
    if abv.is_dirty() {
        return Err(codec_err(
            ErrorKind::NonCanonical,
            "encode requires a finalized abv",
        ));
    }
    let at = wr.pos();
    wr.write(abv.format_version() as u64, 8);
    wr.note("format_version", at);
    let at = wr.pos();
    cdu::encode(wr, Subtype::Default, abv.n_partitions() as u64)?;
    wr.note("n_partitions", at);
    let at = wr.pos();
    cdu::encode(wr, Subtype::Raw1, (1 - abv.root_rare_bit()) as u64)?;
    wr.note("dominant_bit", at);

    let mut prev_id: Option<u32> = None;
    for pi in 0..abv.n_partitions() {
        let p = abv.part(pi);
        let id = abv.part_id(p);
        wr.push_context("partition");
        wr.push_context(id);
        let delta = match prev_id {
            None => id as u64,
            Some(prev) => (id - prev - 1) as u64,
        };
        let at = wr.pos();
        cdu::encode(wr, Subtype::Default, delta)?;
        wr.note("partition_delta", at);
        let at = wr.pos();
        cdu::encode(wr, Subtype::Default, abv.part_nsegs(p) as u64)?;
        wr.note("n_segments", at);
        let at = wr.pos();
        cdu::encode(wr, Subtype::Raw1, (1 - abv.part_rare(p)) as u64)?;
        wr.note("dominant_bit", at);

        let mut prev_end: Option<u64> = None;
        for si in 0..abv.part_nsegs(p) {
            let s = abv.seg(p, si);
            wr.push_context("segment");
            wr.push_context(si);
            let start = abv.seg_start(s) as u64;
            let delta = match prev_end {
                None => start,
                Some(end) => start - end,
            };
            let at = wr.pos();
            cdu::encode(wr, Subtype::InitialDelta, delta)?;
            wr.note("initial_delta", at);
            let at = wr.pos();
            cdu::encode(wr, Subtype::Default, abv.seg_nbits(s))?;
            wr.note("n_bits", at);
            let at = wr.pos();
            let mix = abv.seg_kind(s) == SEG_MIX;
            cdu::encode(wr, Subtype::Raw1, mix as u64)?;
            wr.note("tag", at);
            if mix {
                token::write_tokens(wr, abv.seg_nchunks(s), |ci| {
                    (
                        abv.seg_block(s, ci),
                        abv.chunk_width(s, ci),
                        abv.seg_meta(s, ci).0,
                    )
                })?;
            }
            prev_end = Some(start + abv.seg_nbits(s));
            wr.pop_context();
            wr.pop_context();
        }
        prev_id = Some(id);
        wr.pop_context();
        wr.pop_context();
    }
    wr.pad_to_byte();
    Ok(())
}

fn parse(bytes: &[u8], flags: ValidateFlags) -> Result<Abv> {
    let minimal = flags.contains(ValidateFlags::CDU_MINIMAL);
    let opts = DecodeOpts {
        cdu_minimal: minimal,
        token_bounds: flags.contains(ValidateFlags::TOKEN_BOUNDS),
    };
    let mut rd = BitReader::new(bytes);

    let version = rd.read(8)? as u8;
    if version != FORMAT_VERSION {
        return Err(codec_err(
            ErrorKind::UnsupportedVersion,
            "unknown format version",
        ));
    }
    let (n_partitions, _) = cdu::decode_opt(&mut rd, Subtype::Default, minimal)?;
    let (root_dom, _) = cdu::decode(&mut rd, Subtype::Raw1)?;

    let mut abv = Abv::new(version, bytes.len().saturating_mul(4).clamp(64, 1 << 26))?;
    abv.set_root_rare_bit(1 - root_dom as u8);
    let mut bld = Builder::new(abv)?;

    let mut prev_id: Option<u32> = None;
    for _ in 0..n_partitions {
        let (delta, _) = cdu::decode_opt(&mut rd, Subtype::Default, minimal)?;
        let id = match prev_id {
            None => delta,
            Some(prev) => prev as u64 + 1 + delta,
        };
        if id > u32::MAX as u64 {
            return Err(codec_err(ErrorKind::OutOfRange, "partition id overflow"));
        }
        let id = id as u32;
        let (n_segments, _) = cdu::decode_opt(&mut rd, Subtype::Default, minimal)?;
        let (dom, _) = cdu::decode(&mut rd, Subtype::Raw1)?;
        let mut pb = bld.begin_partition(id, 1 - dom as u8)?;

        let mut prev_end: Option<u64> = None;
        for _ in 0..n_segments {
            let (delta, _) = cdu::decode_opt(&mut rd, Subtype::InitialDelta, minimal)?;
            let start = match prev_end {
                None => delta,
                Some(end) => end + delta,
            };
            let (n_bits, _) = cdu::decode_opt(&mut rd, Subtype::Default, minimal)?;
            if n_bits == 0 {
                return Err(codec_err(ErrorKind::OutOfRange, "zero-length segment"));
            }
            if start + n_bits > PARTITION_BITS {
                return Err(codec_err(
                    ErrorKind::OutOfRange,
                    "segment extends past partition end",
                ));
            }
            let (tag, _) = cdu::decode(&mut rd, Subtype::Raw1)?;
            if tag == 0 {
                pb.add_rle_segment(start as u32, n_bits)?;
            } else {
                let mut sb = pb.begin_mix_segment(start as u32)?;
                let n_chunks = ((n_bits + 63) / 64) as u32;
                let chunk_width = |ci: u32| (n_bits - ci as u64 * 64).min(64) as u32;
                token::read_tokens(
                    &mut rd,
                    n_chunks,
                    chunk_width,
                    &mut |ci, block, raw| sb.append_classified(block, chunk_width(ci), raw),
                    opts,
                )?;
                pb = sb.finalize_segment()?;
            }
            prev_end = Some(start + n_bits);
        }
        bld = pb.finalize_partition()?;
        prev_id = Some(id);
    }

    // canonical zero padding to the byte boundary, nothing after
    let rem = (rd.pos() % 8) as u32;
    if rem != 0 {
        let pad = rd.read(8 - rem)?;
        if pad != 0 {
            return Err(codec_err(ErrorKind::NonCanonical, "nonzero padding"));
        }
    }
    if rd.remaining() != 0 {
        return Err(codec_err(
            ErrorKind::NonCanonical,
            "trailing bytes after stream",
        ));
    }
    Ok(bld.finish())
}

/// The flag-gated validation pass over a populated AbV.
pub(crate) fn validate(abv: &Abv, flags: ValidateFlags) -> Result<()> {
    if flags.contains(ValidateFlags::ORDERING) {
        let mut prev_id: Option<u32> = None;
        for pi in 0..abv.n_partitions() {
            let p = abv.part(pi);
            let id = abv.part_id(p);
            if let Some(prev) = prev_id {
                if id <= prev {
                    return Err(codec_err(
                        ErrorKind::NonCanonical,
                        "partition ids out of order",
                    ));
                }
            }
            prev_id = Some(id);
            let mut prev_end = 0u64;
            for si in 0..abv.part_nsegs(p) {
                let s = abv.seg(p, si);
                let start = abv.seg_start(s) as u64;
                if si > 0 && start < prev_end {
                    return Err(codec_err(ErrorKind::NonCanonical, "segments overlap"));
                }
                if abv.seg_nbits(s) == 0 {
                    return Err(codec_err(ErrorKind::OutOfRange, "zero-length segment"));
                }
                prev_end = start + abv.seg_nbits(s);
            }
        }
    }
    if flags.contains(ValidateFlags::RARE_BIT) {
        for pi in 0..abv.n_partitions() {
            let p = abv.part(pi);
            for si in 0..abv.part_nsegs(p) {
                let s = abv.seg(p, si);
                if abv.seg_kind(s) != SEG_MIX {
                    continue;
                }
                let mut ones = 0u64;
                for ci in 0..abv.seg_nchunks(s) {
                    ones += abv.seg_block(s, ci).count_ones() as u64;
                }
                let expected = if ones * 2 <= abv.seg_nbits(s) { 1 } else { 0 };
                if abv.seg_rare(s) != expected {
                    return Err(codec_err(
                        ErrorKind::NonCanonical,
                        "segment rare bit does not complement its dominant bit",
                    ));
                }
            }
        }
    }
    if flags.contains(ValidateFlags::THRESHOLD) {
        for pi in 0..abv.n_partitions() {
            let p = abv.part(pi);
            let mut prev_end: Option<u64> = None;
            for si in 0..abv.part_nsegs(p) {
                let s = abv.seg(p, si);
                if abv.seg_kind(s) == SEG_RLE && abv.seg_nbits(s) <= RARE_RUN_THRESHOLD {
                    return Err(codec_err(
                        ErrorKind::NonCanonical,
                        "rle segment at or below the rare-run threshold",
                    ));
                }
                let start = abv.seg_start(s) as u64;
                if let Some(end) = prev_end {
                    let gap = start.saturating_sub(end);
                    if gap != 0 && gap < DOMINANT_RUN_THRESHOLD {
                        return Err(codec_err(
                            ErrorKind::NonCanonical,
                            "implicit dominant run below threshold",
                        ));
                    }
                }
                prev_end = Some(start + abv.seg_nbits(s));
            }
        }
    }
    Ok(())
}
