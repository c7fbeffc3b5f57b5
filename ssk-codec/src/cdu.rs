// CDU: the canonical integer codec used for every metadata field of the wire
// format. A subtype is either fixed-width (writes exactly base_bits) or
// variable: one "first" step, middle steps of uniform width, and a final
// remainder step at least as wide as a middle step. Every step except the
// last-possible one carries a continuation bit, 1 iff another step follows.
// Step payloads carry the value least-significant-first, so an encoding is
// minimal exactly when its final step payload is non-zero (or it is a single
// step). The subtype table is built once and read-only afterward.

use crate::bitcur::{BitReader, BitWriter};
use ssk_base::{codec_err, ErrorKind, Result};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub(crate) enum Subtype {
    Default = 0,
    SmallInt = 1,
    MediumInt = 2,
    LargeInt = 3,
    InitialDelta = 4,
    EnumK = 5,
    EnumRank = 6,
    EnumCombined = 7,
    Raw1 = 8,
    Raw2 = 9,
    Raw64 = 10,
}

const N_SUBTYPES: usize = 11;
const MAX_STEPS: usize = 16;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Params {
    pub(crate) base_bits: u8,
    pub(crate) fixed: bool,
    n_steps: u8,
    widths: [u8; MAX_STEPS],
}

impl Params {
    fn fixed(base_bits: u8) -> Params {
        Params {
            base_bits,
            fixed: true,
            n_steps: 1,
            widths: [0; MAX_STEPS],
        }
    }

    // Derive the step width vector: first, then uniform middle steps, then a
    // remainder at least as wide as a middle step, telescoping to base_bits.
    pub(crate) fn variable(first: u8, step: u8, base_bits: u8) -> Params {
        debug_assert!(step >= 1 && base_bits <= 64);
        debug_assert!(first < base_bits);
        let mut widths = [0u8; MAX_STEPS];
        widths[0] = first;
        let mut n = 1;
        let mut rem = base_bits - first;
        while rem > 0 {
            if rem >= 2 * step {
                widths[n] = step;
                rem -= step;
            } else {
                widths[n] = rem;
                rem = 0;
            }
            n += 1;
        }
        Params {
            base_bits,
            fixed: false,
            n_steps: n as u8,
            widths,
        }
    }

    pub(crate) fn widths(&self) -> &[u8] {
        &self.widths[..self.n_steps as usize]
    }
}

static TABLE: OnceLock<[Params; N_SUBTYPES]> = OnceLock::new();

pub(crate) fn params(st: Subtype) -> &'static Params {
    let table = TABLE.get_or_init(|| {
        [
            Params::variable(4, 8, 64),   // Default
            Params::variable(3, 4, 32),   // SmallInt
            Params::variable(8, 8, 64),   // MediumInt
            Params::variable(16, 16, 64), // LargeInt
            Params::variable(7, 8, 32),   // InitialDelta
            Params::variable(3, 3, 6),    // EnumK
            Params::variable(8, 8, 64),   // EnumRank
            Params::variable(10, 8, 64),  // EnumCombined
            Params::fixed(1),             // Raw1
            Params::fixed(2),             // Raw2
            Params::fixed(64),            // Raw64
        ]
    });
    &table[st as usize]
}

/// Encode `value` under `st`, returning the number of bits written.
/// Values exceeding the subtype's base_bits range are rejected.
pub(crate) fn encode(wr: &mut BitWriter, st: Subtype, value: u64) -> Result<u32> {
    encode_with(wr, params(st), value)
}

pub(crate) fn encode_with(wr: &mut BitWriter, p: &Params, value: u64) -> Result<u32> {
    if p.base_bits < 64 && value >> p.base_bits != 0 {
        return Err(codec_err(ErrorKind::OutOfRange, "cdu value exceeds subtype range"));
    }
    if p.fixed {
        wr.write(value, p.base_bits as u32);
        return Ok(p.base_bits as u32);
    }
    // Minimal step count: smallest k whose cumulative width covers the value.
    let widths = p.widths();
    let mut cum = 0u32;
    let mut k = widths.len();
    for (i, w) in widths.iter().enumerate() {
        cum += *w as u32;
        if cum >= 64 || value >> cum == 0 {
            k = i + 1;
            break;
        }
    }
    let mut bits = 0u32;
    let mut shift = 0u32;
    for (i, w) in widths.iter().take(k).enumerate() {
        let w = *w as u32;
        if w > 0 {
            wr.write(value >> shift, w);
            bits += w;
        }
        shift += w;
        if i + 1 < widths.len() {
            let cont = (i + 1 < k) as u64;
            wr.write(cont, 1);
            bits += 1;
        }
    }
    Ok(bits)
}

/// Decode one value, enforcing canonical minimality.
pub(crate) fn decode(rd: &mut BitReader, st: Subtype) -> Result<(u64, u32)> {
    decode_inner(rd, params(st), true)
}

/// Decode one value without the minimality check (validation disabled).
pub(crate) fn decode_lenient(rd: &mut BitReader, st: Subtype) -> Result<(u64, u32)> {
    decode_inner(rd, params(st), false)
}

pub(crate) fn decode_opt(rd: &mut BitReader, st: Subtype, minimal: bool) -> Result<(u64, u32)> {
    decode_inner(rd, params(st), minimal)
}

/// Decode against explicit parameters (table-independent callers, tests).
pub(crate) fn decode_with(rd: &mut BitReader, p: &Params, minimal: bool) -> Result<(u64, u32)> {
    decode_inner(rd, p, minimal)
}

fn decode_inner(rd: &mut BitReader, p: &Params, minimal: bool) -> Result<(u64, u32)> {
    if p.fixed {
        let v = rd.read(p.base_bits as u32)?;
        return Ok((v, p.base_bits as u32));
    }
    let widths = p.widths();
    let mut value = 0u64;
    let mut shift = 0u32;
    let mut bits = 0u32;
    let mut last_payload = 0u64;
    let mut steps = 0usize;
    for (i, w) in widths.iter().enumerate() {
        let w = *w as u32;
        let payload = if w > 0 { rd.read(w)? } else { 0 };
        bits += w;
        value |= payload << shift;
        last_payload = payload;
        steps = i + 1;
        if i + 1 == widths.len() {
            break;
        }
        let cont = rd.read(1)?;
        bits += 1;
        if cont == 0 {
            break;
        }
        shift += w;
    }
    if minimal && steps > 1 && last_payload == 0 {
        return Err(codec_err(
            ErrorKind::NonCanonical,
            "cdu encoding uses more steps than needed",
        ));
    }
    Ok((value, bits))
}
