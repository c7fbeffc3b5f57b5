// The AbV arena: one contiguous allocation holding a root header, a root
// offset array, and a variable region of partition records; each partition
// holds its header, a segment offset array, and its segments; each MIX
// segment holds a header, a packed 2-bit-per-chunk metadata array, an
// adjustable gap, and a block array. Every stored offset is relative to a
// local base (the owning offset array's first element, or the segment's
// variable region), so relocating the backing buffer never invalidates
// anything. All header fields are little-endian.
//
// Root, at offset 0:
//   0  u8  format_version      12 u32 n_partitions
//   1  u8  rare_bit            16 u32 part_cap
//   2  u8  dirty               20 u32 watermark
//   4  u64 cardinality         24 partition offset array, then records
//
// Partition record:
//   0  u32 partition_id        8  u64 cardinality
//   4  u8  rare_bit            16 u32 n_segments
//   5  u8  dirty               20 u32 seg_cap
//                              24 segment offset array, then segments
//
// Segment record (48-byte header):
//   0  u32 start_bit           25 u8  rare_bit
//   8  u64 n_bits              26 u8  dirty
//   16 u64 cardinality         28 u32 n_chunks
//   24 u8  kind (0=RLE 1=MIX)  32/36/40/44 meta_off/meta_cap/blocks_off/blocks_cap
//   48 variable region: [metadata][gap][blocks]
//
// n_bits is 64-bit because a segment may legally span a whole partition
// (2^32 bits, e.g. alternating content with no splittable boundary).

use crate::{FORMAT_VERSION, K_CHUNK_ENUM_MAX};
use ssk_base::{codec_err, ErrorKind, Result};

const ROOT_VERSION: usize = 0;
const ROOT_RARE: usize = 1;
const ROOT_DIRTY: usize = 2;
const ROOT_CARD: usize = 4;
const ROOT_NPARTS: usize = 12;
const ROOT_PCAP: usize = 16;
const ROOT_WATERMARK: usize = 20;
const ROOT_OTAB: usize = 24;

const PART_ID: usize = 0;
const PART_RARE: usize = 4;
const PART_DIRTY: usize = 5;
const PART_CARD: usize = 8;
const PART_NSEGS: usize = 16;
const PART_SCAP: usize = 20;
const PART_OTAB: usize = 24;

const SEG_START: usize = 0;
const SEG_NBITS: usize = 8;
const SEG_CARD: usize = 16;
const SEG_KIND: usize = 24;
const SEG_RARE: usize = 25;
const SEG_DIRTY: usize = 26;
const SEG_NCHUNKS: usize = 28;
const SEG_META_OFF: usize = 32;
const SEG_META_CAP: usize = 36;
const SEG_BLOCKS_OFF: usize = 40;
const SEG_BLOCKS_CAP: usize = 44;
const SEG_HDR: usize = 48;

pub(crate) const SEG_RLE: u8 = 0;
pub(crate) const SEG_MIX: u8 = 1;

const PART_CAP_INIT: u32 = 4;
const SEG_CAP_INIT: u32 = 4;
// Room for 256 chunks of packed 2-bit metadata before the gap must widen.
const META_CAP_INIT: u32 = 64;

pub(crate) const PARTITION_BITS: u64 = 1 << 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PartRef(pub(crate) usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegRef(pub(crate) usize);

/// The in-memory form of one subset key: a single growable allocation
/// addressed by relative offsets.
#[derive(Clone)]
pub struct Abv {
    buf: Vec<u8>,
}

fn alloc_failed<E>(_: E) -> ssk_base::Error {
    codec_err(ErrorKind::Alloc, "abv allocation failed")
}

impl Abv {
    /// A fresh, empty AbV. `initial_bytes` sizes the backing allocation;
    /// it grows on demand regardless.
    pub fn new(format_version: u8, initial_bytes: usize) -> Result<Abv> {
        if format_version != FORMAT_VERSION {
            return Err(codec_err(
                ErrorKind::UnsupportedVersion,
                "unknown format version",
            ));
        }
        let min = ROOT_OTAB + 4 * PART_CAP_INIT as usize;
        let len = initial_bytes.max(min);
        if len > u32::MAX as usize {
            return Err(codec_err(ErrorKind::Alloc, "abv exceeds offset range"));
        }
        let mut buf = Vec::new();
        buf.try_reserve(len).map_err(alloc_failed)?;
        buf.resize(len, 0);
        let mut abv = Abv { buf };
        abv.set_u8(ROOT_VERSION, format_version);
        abv.set_u8(ROOT_RARE, 1);
        abv.set_u8(ROOT_DIRTY, 1);
        abv.set_u32(ROOT_PCAP, PART_CAP_INIT);
        abv.set_u32(ROOT_WATERMARK, (ROOT_OTAB + 4 * PART_CAP_INIT as usize) as u32);
        Ok(abv)
    }

    /// Grow the backing allocation so at least `extra_bytes` are free past
    /// the watermark: geometric doubling with the request as the floor. On
    /// failure the AbV is unchanged.
    pub fn grow(&mut self, extra_bytes: usize) -> Result<()> {
        let wm = self.watermark();
        if self.buf.len() - wm >= extra_bytes {
            return Ok(());
        }
        let need = wm + extra_bytes;
        if need > u32::MAX as usize {
            return Err(codec_err(ErrorKind::Alloc, "abv exceeds offset range"));
        }
        let target = need.max(self.buf.len() * 2).min(u32::MAX as usize);
        self.buf
            .try_reserve(target - self.buf.len())
            .map_err(alloc_failed)?;
        self.buf.resize(target, 0);
        Ok(())
    }

    fn ensure(&mut self, need: usize) -> Result<()> {
        self.grow(need)
    }

    // Field access

    fn u8_at(&self, off: usize) -> u8 {
        self.buf[off]
    }
    fn set_u8(&mut self, off: usize, v: u8) {
        self.buf[off] = v;
    }
    fn u32_at(&self, off: usize) -> u32 {
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.buf[off..off + 4]);
        u32::from_le_bytes(b)
    }
    fn set_u32(&mut self, off: usize, v: u32) {
        self.buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
    }
    fn u64_at(&self, off: usize) -> u64 {
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.buf[off..off + 8]);
        u64::from_le_bytes(b)
    }
    fn set_u64(&mut self, off: usize, v: u64) {
        self.buf[off..off + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn watermark(&self) -> usize {
        self.u32_at(ROOT_WATERMARK) as usize
    }

    // Root queries

    pub fn format_version(&self) -> u8 {
        self.u8_at(ROOT_VERSION)
    }

    /// The bit value that is rare at root scope; partitions absent from the
    /// AbV are filled with its complement.
    pub fn root_rare_bit(&self) -> u8 {
        self.u8_at(ROOT_RARE)
    }

    pub(crate) fn set_root_rare_bit(&mut self, rare: u8) {
        self.set_u8(ROOT_RARE, rare);
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.u8_at(ROOT_DIRTY) != 0
    }

    /// Cached total member count, valid on a finalized AbV.
    pub fn cardinality(&self) -> u64 {
        self.u64_at(ROOT_CARD)
    }

    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    pub(crate) fn n_partitions(&self) -> u32 {
        self.u32_at(ROOT_NPARTS)
    }

    // Partition access

    pub(crate) fn part(&self, idx: u32) -> PartRef {
        debug_assert!(idx < self.n_partitions());
        PartRef(ROOT_OTAB + self.u32_at(ROOT_OTAB + 4 * idx as usize) as usize)
    }

    pub(crate) fn part_id(&self, p: PartRef) -> u32 {
        self.u32_at(p.0 + PART_ID)
    }
    pub(crate) fn part_rare(&self, p: PartRef) -> u8 {
        self.u8_at(p.0 + PART_RARE)
    }
    pub(crate) fn part_card(&self, p: PartRef) -> u64 {
        self.u64_at(p.0 + PART_CARD)
    }
    pub(crate) fn part_nsegs(&self, p: PartRef) -> u32 {
        self.u32_at(p.0 + PART_NSEGS)
    }

    /// Binary search over the partition offset array.
    pub(crate) fn find_partition(&self, id: u32) -> std::result::Result<u32, u32> {
        let mut lo = 0u32;
        let mut hi = self.n_partitions();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mid_id = self.part_id(self.part(mid));
            if mid_id < id {
                lo = mid + 1;
            } else if mid_id > id {
                hi = mid;
            } else {
                return Ok(mid);
            }
        }
        Err(lo)
    }

    // Segment access

    pub(crate) fn seg(&self, p: PartRef, idx: u32) -> SegRef {
        debug_assert!(idx < self.part_nsegs(p));
        let otab = p.0 + PART_OTAB;
        SegRef(otab + self.u32_at(otab + 4 * idx as usize) as usize)
    }

    pub(crate) fn seg_start(&self, s: SegRef) -> u32 {
        self.u32_at(s.0 + SEG_START)
    }
    pub(crate) fn seg_nbits(&self, s: SegRef) -> u64 {
        self.u64_at(s.0 + SEG_NBITS)
    }
    pub(crate) fn seg_card(&self, s: SegRef) -> u64 {
        self.u64_at(s.0 + SEG_CARD)
    }
    pub(crate) fn seg_kind(&self, s: SegRef) -> u8 {
        self.u8_at(s.0 + SEG_KIND)
    }
    pub(crate) fn seg_rare(&self, s: SegRef) -> u8 {
        self.u8_at(s.0 + SEG_RARE)
    }
    pub(crate) fn seg_nchunks(&self, s: SegRef) -> u32 {
        self.u32_at(s.0 + SEG_NCHUNKS)
    }
    pub(crate) fn seg_end(&self, s: SegRef) -> u64 {
        self.seg_start(s) as u64 + self.seg_nbits(s)
    }

    pub(crate) fn seg_block(&self, s: SegRef, chunk: u32) -> u64 {
        debug_assert!(chunk < self.seg_nchunks(s));
        let base = s.0 + SEG_HDR + self.u32_at(s.0 + SEG_BLOCKS_OFF) as usize;
        self.u64_at(base + 8 * chunk as usize)
    }

    /// Chunk metadata: (raw-classified, dirty).
    pub(crate) fn seg_meta(&self, s: SegRef, chunk: u32) -> (bool, bool) {
        debug_assert!(chunk < self.seg_nchunks(s));
        let base = s.0 + SEG_HDR + self.u32_at(s.0 + SEG_META_OFF) as usize;
        let byte = self.u8_at(base + chunk as usize / 4);
        let v = byte >> ((chunk % 4) * 2) & 0b11;
        (v & 0b01 != 0, v & 0b10 != 0)
    }

    fn set_seg_meta(&mut self, s: SegRef, chunk: u32, raw: bool, dirty: bool) {
        let base = s.0 + SEG_HDR + self.u32_at(s.0 + SEG_META_OFF) as usize;
        let at = base + chunk as usize / 4;
        let shift = (chunk % 4) * 2;
        let v = (raw as u8) | ((dirty as u8) << 1);
        let byte = self.u8_at(at);
        self.set_u8(at, byte & !(0b11 << shift) | (v << shift));
    }

    pub(crate) fn chunk_width(&self, s: SegRef, chunk: u32) -> u32 {
        let n_bits = self.seg_nbits(s);
        let lo = chunk as u64 * 64;
        debug_assert!(lo < n_bits);
        (n_bits - lo).min(64) as u32
    }

    // Appends. All of these write at the tail; only the open (last)
    // partition and segment are ever touched.

    pub(crate) fn append_partition(&mut self, id: u32, rare: u8) -> Result<PartRef> {
        if self.n_partitions() == self.u32_at(ROOT_PCAP) {
            self.grow_root_otab()?;
        }
        let need = PART_OTAB + 4 * SEG_CAP_INIT as usize;
        self.ensure(need)?;
        let at = self.watermark();
        self.buf[at..at + need].fill(0);
        self.set_u32(at + PART_ID, id);
        self.set_u8(at + PART_RARE, rare);
        self.set_u8(at + PART_DIRTY, 1);
        self.set_u32(at + PART_SCAP, SEG_CAP_INIT);
        let idx = self.n_partitions();
        self.set_u32(ROOT_OTAB + 4 * idx as usize, (at - ROOT_OTAB) as u32);
        self.set_u32(ROOT_NPARTS, idx + 1);
        self.set_u32(ROOT_WATERMARK, (at + need) as u32);
        Ok(PartRef(at))
    }

    // Double the root offset array in place: the variable region shifts
    // right and every entry (relative to the unmoved array base) rebases.
    fn grow_root_otab(&mut self) -> Result<()> {
        let pcap = self.u32_at(ROOT_PCAP) as usize;
        let delta = 4 * pcap;
        self.ensure(delta)?;
        let wm = self.watermark();
        let var = ROOT_OTAB + 4 * pcap;
        self.buf.copy_within(var..wm, var + delta);
        self.buf[var..var + delta].fill(0);
        for i in 0..self.n_partitions() as usize {
            let at = ROOT_OTAB + 4 * i;
            let v = self.u32_at(at);
            self.set_u32(at, v + delta as u32);
        }
        self.set_u32(ROOT_PCAP, (2 * pcap) as u32);
        self.set_u32(ROOT_WATERMARK, (wm + delta) as u32);
        Ok(())
    }

    fn grow_part_otab(&mut self, p: PartRef) -> Result<()> {
        let scap = self.u32_at(p.0 + PART_SCAP) as usize;
        let delta = 4 * scap;
        self.ensure(delta)?;
        let wm = self.watermark();
        let var = p.0 + PART_OTAB + 4 * scap;
        self.buf.copy_within(var..wm, var + delta);
        self.buf[var..var + delta].fill(0);
        for i in 0..self.part_nsegs(p) as usize {
            let at = p.0 + PART_OTAB + 4 * i;
            let v = self.u32_at(at);
            self.set_u32(at, v + delta as u32);
        }
        self.set_u32(p.0 + PART_SCAP, (2 * scap) as u32);
        self.set_u32(ROOT_WATERMARK, (wm + delta) as u32);
        Ok(())
    }

    fn append_segment_header(&mut self, p: PartRef, start: u32, kind: u8) -> Result<SegRef> {
        if self.part_nsegs(p) == self.u32_at(p.0 + PART_SCAP) {
            self.grow_part_otab(p)?;
        }
        let need = if kind == SEG_MIX {
            SEG_HDR + META_CAP_INIT as usize
        } else {
            SEG_HDR
        };
        self.ensure(need)?;
        let at = self.watermark();
        self.buf[at..at + need].fill(0);
        self.set_u32(at + SEG_START, start);
        self.set_u8(at + SEG_KIND, kind);
        if kind == SEG_MIX {
            self.set_u8(at + SEG_DIRTY, 1);
            self.set_u32(at + SEG_META_CAP, META_CAP_INIT);
            self.set_u32(at + SEG_BLOCKS_OFF, META_CAP_INIT);
        }
        let idx = self.part_nsegs(p);
        let otab = p.0 + PART_OTAB;
        self.set_u32(otab + 4 * idx as usize, (at - otab) as u32);
        self.set_u32(p.0 + PART_NSEGS, idx + 1);
        self.set_u32(ROOT_WATERMARK, (at + need) as u32);
        Ok(SegRef(at))
    }

    pub(crate) fn append_rle_segment(&mut self, p: PartRef, start: u32, n_bits: u64) -> Result<SegRef> {
        let rare = self.part_rare(p);
        let s = self.append_segment_header(p, start, SEG_RLE)?;
        self.set_u64(s.0 + SEG_NBITS, n_bits);
        self.set_u8(s.0 + SEG_RARE, rare);
        let card = if rare == 1 { n_bits } else { 0 };
        self.set_u64(s.0 + SEG_CARD, card);
        Ok(s)
    }

    pub(crate) fn begin_mix_segment(&mut self, p: PartRef, start: u32) -> Result<SegRef> {
        self.append_segment_header(p, start, SEG_MIX)
    }

    pub(crate) fn append_chunk(&mut self, s: SegRef, block: u64, raw: bool) -> Result<()> {
        let n = self.seg_nchunks(s);
        let meta_cap = self.u32_at(s.0 + SEG_META_CAP);
        if n / 4 + 1 > meta_cap {
            self.widen_meta_gap(s)?;
        }
        self.ensure(8)?;
        let at = self.watermark();
        debug_assert_eq!(
            at,
            s.0 + SEG_HDR + self.u32_at(s.0 + SEG_BLOCKS_OFF) as usize + 8 * n as usize
        );
        self.set_u64(at, block);
        self.set_u32(ROOT_WATERMARK, (at + 8) as u32);
        self.set_u32(s.0 + SEG_BLOCKS_CAP, n + 1);
        self.set_seg_meta(s, n, raw, true);
        self.set_u32(s.0 + SEG_NCHUNKS, n + 1);
        Ok(())
    }

    // The metadata array has outgrown the gap: move the block array toward
    // the tail, widening the gap so the metadata can keep growing in place.
    fn widen_meta_gap(&mut self, s: SegRef) -> Result<()> {
        let meta_cap = self.u32_at(s.0 + SEG_META_CAP) as usize;
        let delta = meta_cap;
        self.ensure(delta)?;
        let wm = self.watermark();
        let var = s.0 + SEG_HDR;
        let blocks = var + self.u32_at(s.0 + SEG_BLOCKS_OFF) as usize;
        self.buf.copy_within(blocks..wm, blocks + delta);
        self.buf[var + meta_cap..var + meta_cap + delta].fill(0);
        self.set_u32(s.0 + SEG_META_CAP, (meta_cap + delta) as u32);
        let off = self.u32_at(s.0 + SEG_BLOCKS_OFF);
        self.set_u32(s.0 + SEG_BLOCKS_OFF, off + delta as u32);
        self.set_u32(ROOT_WATERMARK, (wm + delta) as u32);
        Ok(())
    }

    // Finalization: cached cardinalities and rare bits, dirty flags off.

    pub(crate) fn finalize_mix_segment(&mut self, s: SegRef, n_bits: u64) {
        self.set_u64(s.0 + SEG_NBITS, n_bits);
        let n = self.seg_nchunks(s);
        let mut ones = 0u64;
        for i in 0..n {
            ones += self.seg_block(s, i).count_ones() as u64;
        }
        self.set_u64(s.0 + SEG_CARD, ones);
        let rare = if ones * 2 <= n_bits { 1 } else { 0 };
        self.set_u8(s.0 + SEG_RARE, rare);
        // clear chunk dirty bits, preserving token types
        let base = s.0 + SEG_HDR + self.u32_at(s.0 + SEG_META_OFF) as usize;
        for i in 0..(n as usize + 3) / 4 {
            let b = self.u8_at(base + i);
            self.set_u8(base + i, b & 0b0101_0101);
        }
        self.set_u8(s.0 + SEG_DIRTY, 0);
    }

    pub(crate) fn finalize_partition(&mut self, p: PartRef) {
        let nsegs = self.part_nsegs(p);
        let mut card = 0u64;
        let mut covered = 0u64;
        for i in 0..nsegs {
            let s = self.seg(p, i);
            card += self.seg_card(s);
            covered += self.seg_nbits(s);
        }
        if self.part_rare(p) == 0 {
            // dominant-one gaps contribute their length
            card += PARTITION_BITS - covered;
        }
        self.set_u64(p.0 + PART_CARD, card);
        self.set_u8(p.0 + PART_DIRTY, 0);
    }

    pub(crate) fn finalize_root(&mut self) {
        let nparts = self.n_partitions();
        let mut card = 0u64;
        for i in 0..nparts {
            card = card.wrapping_add(self.part_card(self.part(i)));
        }
        if self.root_rare_bit() == 0 {
            let absent = PARTITION_BITS - nparts as u64;
            card = card.wrapping_add(absent.wrapping_mul(PARTITION_BITS));
        }
        self.set_u64(ROOT_CARD, card);
        self.set_u8(ROOT_DIRTY, 0);
    }

    /// Classification rule for chunk metadata: ENUM iff the popcount is
    /// within the rank table.
    pub(crate) fn classify_raw(block: u64) -> bool {
        block.count_ones() > K_CHUNK_ENUM_MAX
    }
}

impl std::fmt::Debug for Abv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Abv")
            .field("format_version", &self.format_version())
            .field("rare_bit", &self.root_rare_bit())
            .field("n_partitions", &self.n_partitions())
            .field("cardinality", &self.cardinality())
            .field("bytes", &self.buf.len())
            .finish()
    }
}

// Structural equality: same set, same canonical structure. Capacities,
// gaps and cached values are representation detail and excluded.
impl PartialEq for Abv {
    fn eq(&self, other: &Abv) -> bool {
        if self.format_version() != other.format_version()
            || self.root_rare_bit() != other.root_rare_bit()
            || self.n_partitions() != other.n_partitions()
        {
            return false;
        }
        for pi in 0..self.n_partitions() {
            let (pa, pb) = (self.part(pi), other.part(pi));
            if self.part_id(pa) != other.part_id(pb)
                || self.part_rare(pa) != other.part_rare(pb)
                || self.part_nsegs(pa) != other.part_nsegs(pb)
            {
                return false;
            }
            for si in 0..self.part_nsegs(pa) {
                let (sa, sb) = (self.seg(pa, si), other.seg(pb, si));
                if self.seg_start(sa) != other.seg_start(sb)
                    || self.seg_nbits(sa) != other.seg_nbits(sb)
                    || self.seg_kind(sa) != other.seg_kind(sb)
                    || self.seg_nchunks(sa) != other.seg_nchunks(sb)
                {
                    return false;
                }
                for ci in 0..self.seg_nchunks(sa) {
                    if self.seg_block(sa, ci) != other.seg_block(sb, ci)
                        || self.seg_meta(sa, ci).0 != other.seg_meta(sb, ci).0
                    {
                        return false;
                    }
                }
            }
        }
        true
    }
}

impl Eq for Abv {}
