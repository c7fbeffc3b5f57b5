// Combinadic rank/unrank of chunk bit patterns. A chunk's n-bit pattern
// lives in the top n bits of its block word, position p at bit 63-p, and is
// ranked in ascending numeric order among the C(n,k) patterns of the same
// popcount. The binomial and rank-width tables are built once behind a
// one-shot gate and read-only afterward.

use crate::K_CHUNK_ENUM_MAX;
use std::sync::OnceLock;

const N_MAX: usize = 64;
const K_MAX: usize = K_CHUNK_ENUM_MAX as usize;

struct RankTable {
    // choose[n][k] = C(n,k) for n 0..=64, k 0..=18; 0 when k > n.
    choose: [[u64; K_MAX + 1]; N_MAX + 1],
    // bits[n][k] = ceil(log2(C(n,k))), the exact width of a rank field.
    bits: [[u8; K_MAX + 1]; N_MAX + 1],
}

static TABLE: OnceLock<RankTable> = OnceLock::new();

fn table() -> &'static RankTable {
    TABLE.get_or_init(|| {
        let mut choose = [[0u64; K_MAX + 1]; N_MAX + 1];
        for n in 0..=N_MAX {
            choose[n][0] = 1;
            for k in 1..=K_MAX.min(n) {
                choose[n][k] = choose[n - 1][k - 1] + choose[n - 1][k];
            }
        }
        let mut bits = [[0u8; K_MAX + 1]; N_MAX + 1];
        for n in 0..=N_MAX {
            for k in 0..=K_MAX {
                let c = choose[n][k];
                bits[n][k] = if c <= 1 {
                    0
                } else {
                    (64 - (c - 1).leading_zeros()) as u8
                };
            }
        }
        RankTable { choose, bits }
    })
}

/// C(n,k) for n <= 64, k <= 18; zero when k > n.
pub(crate) fn choose(n: u32, k: u32) -> u64 {
    debug_assert!(n as usize <= N_MAX && k as usize <= K_MAX);
    table().choose[n as usize][k as usize]
}

/// Exact bit width of a rank field for an (n,k) chunk.
pub(crate) fn rank_width(n: u32, k: u32) -> u32 {
    debug_assert!(n as usize <= N_MAX && k as usize <= K_MAX);
    table().bits[n as usize][k as usize] as u32
}

pub(crate) fn should_use_enum(k: u32) -> bool {
    k <= K_CHUNK_ENUM_MAX
}

fn top_mask(n: u32) -> u64 {
    if n == 0 {
        0
    } else {
        u64::MAX << (64 - n)
    }
}

/// Rank an n-bit pattern (top n bits of `word`) among the patterns of equal
/// popcount, scanning positions high-to-low: a set bit with n_rem positions
/// and k_rem ones remaining contributes C(n_rem - 1, k_rem).
pub(crate) fn enum_rank(word: u64, n: u32) -> u64 {
    let word = word & top_mask(n);
    let mut k_rem = word.count_ones();
    debug_assert!(k_rem <= K_CHUNK_ENUM_MAX);
    let mut rank = 0u64;
    for i in 0..n {
        if k_rem == 0 {
            break;
        }
        if word >> (63 - i) & 1 != 0 {
            rank += choose(n - i - 1, k_rem);
            k_rem -= 1;
        }
    }
    rank
}

/// Inverse of enum_rank. Total: an out-of-bounds rank still yields a
/// deterministic pattern; the bound itself is enforced by validation.
pub(crate) fn enum_unrank(rank: u64, n: u32, k: u32) -> u64 {
    let mut word = 0u64;
    let mut k_rem = k;
    let mut rank = rank;
    for i in 0..n {
        if k_rem == 0 {
            break;
        }
        let c = choose(n - i - 1, k_rem);
        if rank >= c {
            word |= 1 << (63 - i);
            rank -= c;
            k_rem -= 1;
        }
    }
    word
}
