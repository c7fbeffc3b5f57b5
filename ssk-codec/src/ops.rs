// Set algebra over AbVs. Operations run per partition on the interval
// representation and replay results through the canonical assembly path, so
// every result is a clean, encodable AbV. Partitions absent from an input
// are its root-scope fill (empty or full); combining the two fill bits with
// the same boolean op keeps dense (complement-coded) inputs correct without
// ever materializing their absent partitions.

use crate::abv::{Abv, PARTITION_BITS};
use crate::build::Builder;
use crate::canon::{self, Interval};
use crate::FORMAT_VERSION;
use ssk_base::Result;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetOp {
    Union,
    Intersect,
    Except,
}

impl SetOp {
    fn fill(self, a: bool, b: bool) -> bool {
        match self {
            SetOp::Union => a || b,
            SetOp::Intersect => a && b,
            SetOp::Except => a && !b,
        }
    }
}

fn union_intervals(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out: Vec<Interval> = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() || j < b.len() {
        let next = if j >= b.len() || (i < a.len() && a[i].0 <= b[j].0) {
            let iv = a[i];
            i += 1;
            iv
        } else {
            let iv = b[j];
            j += 1;
            iv
        };
        match out.last_mut() {
            Some(last) if last.1 >= next.0 => last.1 = last.1.max(next.1),
            _ => out.push(next),
        }
    }
    out
}

fn intersect_intervals(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        let lo = a[i].0.max(b[j].0);
        let hi = a[i].1.min(b[j].1);
        if lo < hi {
            out.push((lo, hi));
        }
        if a[i].1 <= b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

fn except_intervals(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let mut out = Vec::new();
    let mut j = 0;
    for &(lo, hi) in a {
        let mut lo = lo;
        while j < b.len() && b[j].1 <= lo {
            j += 1;
        }
        let mut k = j;
        while k < b.len() && b[k].0 < hi {
            if lo < b[k].0 {
                out.push((lo, b[k].0));
            }
            lo = lo.max(b[k].1);
            k += 1;
        }
        if lo < hi {
            out.push((lo, hi));
        }
    }
    out
}

fn combine(op: SetOp, a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    match op {
        SetOp::Union => union_intervals(a, b),
        SetOp::Intersect => intersect_intervals(a, b),
        SetOp::Except => except_intervals(a, b),
    }
}

fn set_op(a: &Abv, b: &Abv, op: SetOp) -> Result<Abv> {
    let fill_a = a.root_rare_bit() == 0;
    let fill_b = b.root_rare_bit() == 0;
    let fill_r = op.fill(fill_a, fill_b);
    let mut out = Abv::new(FORMAT_VERSION, 64)?;
    out.set_root_rare_bit(if fill_r { 0 } else { 1 });
    let mut bld = Builder::new(out)?;

    let full: Vec<Interval> = vec![(0, PARTITION_BITS)];

    let (mut i, mut j) = (0u32, 0u32);
    while i < a.n_partitions() || j < b.n_partitions() {
        let ida = (i < a.n_partitions()).then(|| a.part_id(a.part(i)));
        let idb = (j < b.n_partitions()).then(|| b.part_id(b.part(j)));
        let pid = match (ida, idb) {
            (Some(x), Some(y)) => x.min(y),
            (Some(x), None) => x,
            (None, Some(y)) => y,
            (None, None) => unreachable!(),
        };
        let iva = if ida == Some(pid) {
            let ivs = canon::partition_intervals(a, a.part(i));
            i += 1;
            ivs
        } else if fill_a {
            full.clone()
        } else {
            Vec::new()
        };
        let ivb = if idb == Some(pid) {
            let ivs = canon::partition_intervals(b, b.part(j));
            j += 1;
            ivs
        } else if fill_b {
            full.clone()
        } else {
            Vec::new()
        };
        let r = combine(op, &iva, &ivb);
        bld = canon::build_partition(bld, pid, &r)?;
    }
    Ok(bld.finish())
}

impl Abv {
    /// Members of either set; the result is clean and canonical.
    pub fn union(&self, other: &Abv) -> Result<Abv> {
        set_op(self, other, SetOp::Union)
    }

    /// Members of both sets.
    pub fn intersect(&self, other: &Abv) -> Result<Abv> {
        set_op(self, other, SetOp::Intersect)
    }

    /// Members of `self` not in `other`.
    pub fn except(&self, other: &Abv) -> Result<Abv> {
        set_op(self, other, SetOp::Except)
    }

    /// The canonical scalar for this subset.
    pub fn to_key(&self) -> Result<SubsetKey> {
        Ok(SubsetKey(self.encode()?))
    }
}

/// Total order over subsets: lexicographic byte compare of the canonical
/// encodings.
pub fn compare(a: &Abv, b: &Abv) -> Result<Ordering> {
    Ok(a.encode()?.cmp(&b.encode()?))
}

/// The canonical byte scalar identifying one subset. Ordering is plain
/// byte order, matching `compare` on the decoded sets.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubsetKey(Vec<u8>);

impl SubsetKey {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn decode(&self, flags: crate::ValidateFlags) -> Result<Abv> {
        Abv::decode(&self.0, flags)
    }
}

impl AsRef<[u8]> for SubsetKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
