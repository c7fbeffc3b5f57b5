// The append-only assembly chain: Builder -> PartitionBuilder ->
// SegmentBuilder, each begin_* consuming its parent and each finalize_*
// handing it back with cached values recomputed. Partitions must arrive in
// ascending id order, segments in ascending start order; chunks are 64 bits
// except a trailing short one.

use crate::abv::{Abv, PartRef, SegRef, PARTITION_BITS};
use ssk_base::{codec_err, err, ErrorKind, Result};

#[derive(Debug)]
pub struct Builder {
    abv: Abv,
    last_id: Option<u32>,
}

impl Builder {
    /// Start assembling into a fresh AbV.
    pub fn new(abv: Abv) -> Result<Builder> {
        if abv.n_partitions() != 0 {
            return Err(err("builder requires an empty abv"));
        }
        Ok(Builder { abv, last_id: None })
    }

    pub fn begin_partition(self, id: u32, rare_bit: u8) -> Result<PartitionBuilder> {
        if rare_bit > 1 {
            return Err(err("rare bit must be 0 or 1"));
        }
        if let Some(last) = self.last_id {
            if id <= last {
                return Err(codec_err(
                    ErrorKind::NonCanonical,
                    "partition ids must strictly ascend",
                ));
            }
        }
        let mut b = self;
        let part = b.abv.append_partition(id, rare_bit)?;
        Ok(PartitionBuilder {
            b,
            part,
            id,
            last_end: 0,
        })
    }

    /// Finalize the root and hand the finished AbV back.
    pub fn finish(mut self) -> Abv {
        self.abv.finalize_root();
        self.abv
    }

    pub(crate) fn abv(&self) -> &Abv {
        &self.abv
    }
}

pub struct PartitionBuilder {
    b: Builder,
    part: PartRef,
    id: u32,
    last_end: u64,
}

impl PartitionBuilder {
    fn check_extent(&self, start_bit: u32, n_bits: u64) -> Result<()> {
        if (start_bit as u64) < self.last_end {
            return Err(codec_err(
                ErrorKind::NonCanonical,
                "segment starts before previous segment ends",
            ));
        }
        if n_bits == 0 {
            return Err(codec_err(ErrorKind::OutOfRange, "zero-length segment"));
        }
        if start_bit as u64 + n_bits > PARTITION_BITS {
            return Err(codec_err(
                ErrorKind::OutOfRange,
                "segment extends past partition end",
            ));
        }
        Ok(())
    }

    /// One run of the partition's rare bit, emitted without chunk payload.
    pub fn add_rle_segment(&mut self, start_bit: u32, n_bits: u64) -> Result<()> {
        self.check_extent(start_bit, n_bits)?;
        self.b.abv.append_rle_segment(self.part, start_bit, n_bits)?;
        self.last_end = start_bit as u64 + n_bits;
        Ok(())
    }

    pub fn begin_mix_segment(self, start_bit: u32) -> Result<SegmentBuilder> {
        self.check_extent(start_bit, 1)?;
        let mut p = self;
        let seg = p.b.abv.begin_mix_segment(p.part, start_bit)?;
        Ok(SegmentBuilder {
            p,
            seg,
            start_bit,
            bits: 0,
            saw_short: false,
        })
    }

    pub fn finalize_partition(self) -> Result<Builder> {
        let mut p = self;
        let nsegs = p.b.abv.part_nsegs(p.part);
        if nsegs == 0 {
            // A zero-segment partition is entirely dominant-filled; it is
            // canonical only when that differs from the root-scope fill,
            // otherwise omission is the one encoding.
            if p.b.abv.part_rare(p.part) == p.b.abv.root_rare_bit() {
                return Err(codec_err(
                    ErrorKind::NonCanonical,
                    "zero-segment partition matches root fill",
                ));
            }
        }
        p.b.abv.finalize_partition(p.part);
        p.b.last_id = Some(p.id);
        Ok(p.b)
    }
}

pub struct SegmentBuilder {
    p: PartitionBuilder,
    seg: SegRef,
    start_bit: u32,
    bits: u64,
    saw_short: bool,
}

impl SegmentBuilder {
    /// Append one chunk; every chunk is 64 bits except an optional final
    /// short one. The block's pattern occupies its top `width` bits.
    pub fn append_chunk(&mut self, block: u64, width: u32) -> Result<()> {
        let block = mask_block(block, width);
        self.append_classified(block, width, Abv::classify_raw(block))
    }

    /// Decoder entry: the wire dictates the classification.
    pub(crate) fn append_classified(&mut self, block: u64, width: u32, raw: bool) -> Result<()> {
        if !(1..=64).contains(&width) {
            return Err(codec_err(ErrorKind::OutOfRange, "chunk width must be 1..=64"));
        }
        if self.saw_short {
            return Err(err("short chunk must be the segment's last"));
        }
        if self.start_bit as u64 + self.bits + width as u64 > PARTITION_BITS {
            return Err(codec_err(
                ErrorKind::OutOfRange,
                "segment extends past partition end",
            ));
        }
        self.p.b.abv.append_chunk(self.seg, mask_block(block, width), raw)?;
        self.bits += width as u64;
        if width < 64 {
            self.saw_short = true;
        }
        Ok(())
    }

    pub fn finalize_segment(self) -> Result<PartitionBuilder> {
        if self.bits == 0 {
            return Err(codec_err(ErrorKind::OutOfRange, "zero-length segment"));
        }
        let mut s = self;
        s.p.b.abv.finalize_mix_segment(s.seg, s.bits);
        s.p.last_end = s.start_bit as u64 + s.bits;
        Ok(s.p)
    }
}

fn mask_block(block: u64, width: u32) -> u64 {
    if width >= 64 {
        block
    } else {
        block & (u64::MAX << (64 - width))
    }
}
