use crate::combin::{choose, enum_rank, enum_unrank, rank_width, should_use_enum};
use test_log::test;

// Direct binomial for cross-checking the table.
fn slow_choose(n: u64, k: u64) -> u64 {
    if k > n {
        return 0;
    }
    let mut c: u128 = 1;
    for i in 0..k {
        c = c * (n - i) as u128 / (i + 1) as u128;
    }
    c as u64
}

#[test]
fn test_choose_table() {
    for n in 0..=64u32 {
        for k in 0..=18u32 {
            assert_eq!(choose(n, k), slow_choose(n as u64, k as u64), "C({},{})", n, k);
        }
    }
}

#[test]
fn test_rank_width() {
    assert_eq!(rank_width(1, 0), 0);
    assert_eq!(rank_width(1, 1), 0);
    assert_eq!(rank_width(64, 0), 0);
    assert_eq!(rank_width(64, 1), 6); // C = 64, ranks 0..63
    assert_eq!(rank_width(64, 2), 11); // C = 2016
    assert_eq!(rank_width(2, 1), 1);
    assert_eq!(rank_width(3, 1), 2);
    for n in 1..=64u32 {
        for k in 0..=18u32 {
            let c = choose(n, k);
            let w = rank_width(n, k);
            if c <= 1 {
                assert_eq!(w, 0);
            } else {
                assert!(1u64 << w >= c);
                assert!(1u64 << (w - 1) < c);
            }
        }
    }
}

#[test]
fn test_rank_unrank_exhaustive_small() {
    for n in 1..=10u32 {
        for pattern in 0u64..(1 << n) {
            let word = pattern << (64 - n);
            let k = word.count_ones();
            let rank = enum_rank(word, n);
            assert!(rank < choose(n, k), "rank {} out of range n={} k={}", rank, n, k);
            assert_eq!(enum_unrank(rank, n, k), word, "n={} k={} rank={}", n, k, rank);
        }
    }
}

#[test]
fn test_rank_orders_by_numeric_value() {
    // among equal-popcount patterns, rank ascends with the word value
    let n = 8u32;
    let k = 3u32;
    let mut patterns: Vec<u64> = (0u64..(1 << n))
        .filter(|p| p.count_ones() == k)
        .map(|p| p << (64 - n))
        .collect();
    patterns.sort_unstable();
    for (expected, word) in patterns.iter().enumerate() {
        assert_eq!(enum_rank(*word, n), expected as u64);
    }
}

#[test]
fn test_rank_wide_chunks() {
    // full-width chunks, popcount at the enum limit
    let word: u64 = 0x8000_0000_0004_0201 | 0x00ff_f000_0000_0000;
    let k = word.count_ones();
    assert!(should_use_enum(k));
    let rank = enum_rank(word, 64);
    assert!(rank < choose(64, k));
    assert_eq!(enum_unrank(rank, 64, k), word);
    // extremes: lowest and highest rank
    let lowest = (1u64 << 18) - 1; // 18 ones packed at the LSB end
    assert_eq!(enum_rank(lowest, 64), 0);
    let highest = u64::MAX << (64 - 18); // 18 ones packed at the MSB end
    assert_eq!(enum_rank(highest, 64), choose(64, 18) - 1);
}

#[test]
fn test_should_use_enum_boundary() {
    assert!(should_use_enum(18));
    assert!(!should_use_enum(19));
}
