// Canonical assembly: everything that turns "which bits are set" into the
// one segmentation Format 0 encodes. Partition content travels as sorted,
// disjoint, coalesced intervals of set bits; the planner classifies the
// alternating rare/dominant runs (RLE over-threshold rare runs, implicit
// over-threshold dominant gaps, MIX for the rest), splits over-long MIX
// segments at rare-rare chunk boundaries, and replays the plan through the
// builder. from_members, the set operations, and canonicalize all funnel
// through here, which is what makes the encoding unique per subset.

use crate::abv::{Abv, PartRef, PARTITION_BITS, SEG_RLE};
use crate::build::Builder;
use crate::{DOMINANT_RUN_THRESHOLD, FORMAT_VERSION, MAX_SEGMENT_LEN_HINT, RARE_RUN_THRESHOLD};
use ssk_base::Result;

/// Half-open run of set bits within one partition's 2^32-bit space.
pub(crate) type Interval = (u64, u64);

/// Complement of a sorted disjoint interval list within the partition.
pub(crate) fn complement(ivs: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::with_capacity(ivs.len() + 1);
    let mut pos = 0u64;
    for &(lo, hi) in ivs {
        if pos < lo {
            out.push((pos, lo));
        }
        pos = hi;
    }
    if pos < PARTITION_BITS {
        out.push((pos, PARTITION_BITS));
    }
    out
}

/// Extract one partition's set bits as intervals: dominant-filled gaps,
/// RLE runs and MIX blocks all flatten to the same representation.
pub(crate) fn partition_intervals(abv: &Abv, p: PartRef) -> Vec<Interval> {
    let dom_one = abv.part_rare(p) == 0;
    let rare_one = abv.part_rare(p) == 1;
    let mut out: Vec<Interval> = Vec::new();
    let push = |out: &mut Vec<Interval>, lo: u64, hi: u64| match out.last_mut() {
        Some(last) if last.1 == lo => last.1 = hi,
        _ => out.push((lo, hi)),
    };
    let mut prev_end = 0u64;
    for si in 0..abv.part_nsegs(p) {
        let s = abv.seg(p, si);
        let start = abv.seg_start(s) as u64;
        if dom_one && prev_end < start {
            push(&mut out, prev_end, start);
        }
        if abv.seg_kind(s) == SEG_RLE {
            if rare_one {
                push(&mut out, start, start + abv.seg_nbits(s));
            }
        } else {
            for ci in 0..abv.seg_nchunks(s) {
                let mut word = abv.seg_block(s, ci);
                let base = start + 64 * ci as u64;
                while word != 0 {
                    let p0 = word.leading_zeros();
                    let run = (word << p0).leading_ones();
                    push(&mut out, base + p0 as u64, base + (p0 + run) as u64);
                    if p0 + run >= 64 {
                        word = 0;
                    } else {
                        word &= u64::MAX >> (p0 + run);
                    }
                }
            }
        }
        prev_end = start + abv.seg_nbits(s);
    }
    if dom_one && prev_end < PARTITION_BITS {
        push(&mut out, prev_end, PARTITION_BITS);
    }
    out
}

fn is_rare_at(rare_runs: &[Interval], bit: u64) -> bool {
    let idx = rare_runs.partition_point(|iv| iv.1 <= bit);
    idx < rare_runs.len() && rare_runs[idx].0 <= bit
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SegPlan {
    Rle,
    Mix,
}

// Classify the alternating run sequence and group what is left into MIX
// regions. Leading and trailing dominant runs are implicit at any length;
// interior dominant runs go implicit only at the threshold.
fn plan_segments(rare_runs: &[Interval]) -> Vec<(u64, u64, SegPlan)> {
    let dom_runs = complement(rare_runs);
    let mut runs: Vec<(u64, u64, bool)> = Vec::with_capacity(rare_runs.len() + dom_runs.len());
    runs.extend(rare_runs.iter().map(|&(lo, hi)| (lo, hi, true)));
    runs.extend(dom_runs.iter().map(|&(lo, hi)| (lo, hi, false)));
    runs.sort_unstable_by_key(|r| r.0);

    let mut out: Vec<(u64, u64, SegPlan)> = Vec::new();
    let mut open_mix: Option<(u64, u64)> = None;
    for (lo, hi, rare) in runs {
        let len = hi - lo;
        let boundary = if rare {
            len > RARE_RUN_THRESHOLD
        } else {
            len >= DOMINANT_RUN_THRESHOLD || lo == 0 || hi == PARTITION_BITS
        };
        if boundary {
            if let Some((mlo, mhi)) = open_mix.take() {
                out.push((mlo, mhi, SegPlan::Mix));
            }
            if rare {
                out.push((lo, hi, SegPlan::Rle));
            }
        } else {
            match &mut open_mix {
                Some((_, mhi)) => *mhi = hi,
                None => open_mix = Some((lo, hi)),
            }
        }
    }
    if let Some((mlo, mhi)) = open_mix {
        out.push((mlo, mhi, SegPlan::Mix));
    }
    out
}

// Over-long MIX segments split at rare-rare chunk boundaries: the nearest
// one at or before the hint, else the first one after, else not at all.
fn split_points(lo: u64, hi: u64, rare_runs: &[Interval]) -> Vec<(u64, u64)> {
    let mut out = Vec::new();
    let mut s = lo;
    let hint_chunks = MAX_SEGMENT_LEN_HINT / 64;
    while hi - s > MAX_SEGMENT_LEN_HINT {
        let mut cut = None;
        for m in (1..=hint_chunks).rev() {
            let b = s + 64 * m;
            if b >= hi {
                continue;
            }
            if is_rare_at(rare_runs, b - 1) && is_rare_at(rare_runs, b) {
                cut = Some(b);
                break;
            }
        }
        if cut.is_none() {
            let mut m = hint_chunks + 1;
            loop {
                let b = s + 64 * m;
                if b >= hi {
                    break;
                }
                if is_rare_at(rare_runs, b - 1) && is_rare_at(rare_runs, b) {
                    cut = Some(b);
                    break;
                }
                m += 1;
            }
        }
        match cut {
            Some(b) => {
                out.push((s, b));
                s = b;
            }
            None => break,
        }
    }
    out.push((s, hi));
    out
}

// Materialize the chunk words of one MIX segment from the set-bit
// intervals overlapping it.
fn emit_mix(
    pb: crate::build::PartitionBuilder,
    seg_lo: u64,
    seg_hi: u64,
    ones: &[Interval],
) -> Result<crate::build::PartitionBuilder> {
    let mut sb = pb.begin_mix_segment(seg_lo as u32)?;
    let mut idx = ones.partition_point(|iv| iv.1 <= seg_lo);
    let mut pos = seg_lo;
    while pos < seg_hi {
        let width = (seg_hi - pos).min(64) as u32;
        while idx < ones.len() && ones[idx].1 <= pos {
            idx += 1;
        }
        let mut word = 0u64;
        let mut j = idx;
        while j < ones.len() && ones[j].0 < pos + width as u64 {
            let lo = ones[j].0.max(pos);
            let hi = ones[j].1.min(pos + width as u64);
            let off = (lo - pos) as u32;
            let len = (hi - lo) as u32;
            word |= (u64::MAX << (64 - len)) >> off;
            j += 1;
        }
        sb.append_chunk(word, width)?;
        pos += width as u64;
    }
    sb.finalize_segment()
}

/// Append one partition's canonical form to the builder. Presence is
/// decided against the root-scope fill: content equal to the fill is
/// omitted, anything else gets a record.
pub(crate) fn build_partition(bld: Builder, id: u32, ones: &[Interval]) -> Result<Builder> {
    let total: u64 = ones.iter().map(|&(lo, hi)| hi - lo).sum();
    let root_fill_one = bld.abv().root_rare_bit() == 0;
    if total == 0 {
        if !root_fill_one {
            return Ok(bld);
        }
        let pb = bld.begin_partition(id, 1)?;
        return pb.finalize_partition();
    }
    if total == PARTITION_BITS {
        if root_fill_one {
            return Ok(bld);
        }
        let pb = bld.begin_partition(id, 0)?;
        return pb.finalize_partition();
    }
    let rare = if total * 2 <= PARTITION_BITS { 1u8 } else { 0 };
    let rare_runs: Vec<Interval> = if rare == 1 {
        ones.to_vec()
    } else {
        complement(ones)
    };
    let mut pb = bld.begin_partition(id, rare)?;
    for (lo, hi, plan) in plan_segments(&rare_runs) {
        match plan {
            SegPlan::Rle => pb.add_rle_segment(lo as u32, hi - lo)?,
            SegPlan::Mix => {
                for (slo, shi) in split_points(lo, hi, &rare_runs) {
                    pb = emit_mix(pb, slo, shi, ones)?;
                }
            }
        }
    }
    pb.finalize_partition()
}

impl Abv {
    /// Assemble the canonical AbV of an arbitrary member collection.
    pub fn from_members(members: impl IntoIterator<Item = u64>) -> Result<Abv> {
        let mut ids: Vec<u64> = members.into_iter().collect();
        ids.sort_unstable();
        ids.dedup();
        let mut bld = Builder::new(Abv::new(FORMAT_VERSION, 64 + ids.len() / 4)?)?;
        let mut i = 0;
        while i < ids.len() {
            let pid = (ids[i] >> 32) as u32;
            let mut ivs: Vec<Interval> = Vec::new();
            while i < ids.len() && (ids[i] >> 32) as u32 == pid {
                let low = ids[i] & 0xffff_ffff;
                match ivs.last_mut() {
                    Some(last) if last.1 == low => last.1 += 1,
                    _ => ivs.push((low, low + 1)),
                }
                i += 1;
            }
            bld = build_partition(bld, pid, &ivs)?;
        }
        Ok(bld.finish())
    }

    /// Rebuild this AbV in canonical form: token types re-evaluated,
    /// segments merged and split per the thresholds, stale RLE rewritten,
    /// dirty flags cleared, cardinalities recomputed.
    pub fn canonicalize(&self) -> Result<Abv> {
        let mut out = Abv::new(self.format_version(), 64)?;
        out.set_root_rare_bit(self.root_rare_bit());
        let mut bld = Builder::new(out)?;
        for pi in 0..self.n_partitions() {
            let p = self.part(pi);
            let ivs = partition_intervals(self, p);
            bld = build_partition(bld, self.part_id(p), &ivs)?;
        }
        Ok(bld.finish())
    }
}
