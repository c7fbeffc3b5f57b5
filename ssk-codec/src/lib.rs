// Subset keys assign every finite subset of the 64-bit id universe one
// canonical byte scalar, fit for a database column, for lexicographic
// comparison, and for set algebra without materializing members.
//
// - A subset splits into 2^32-bit _partitions_ keyed by the high half of
//   each member. Only partitions that differ from the root-scope fill are
//   present, in ascending id order.
// - A partition splits into _segments_: RLE (one over-threshold run of the
//   partition's rare bit) or MIX (anything else), in ascending start order.
//   Dominant-bit runs at the thresholds stay implicit as inter-segment gaps.
// - A MIX segment splits into 64-bit _chunks_ (the last may be short), each
//   encoded as one _token_: ENUM (combinadic rank, popcount <= 18), RAW
//   (verbatim bits), or RAW_RUN (a coalesced run of RAW chunks).
// - Every metadata integer rides the CDU codec, which enforces one minimal
//   encoding per value; the whole stream is one packed MSB-first bit
//   sequence, identical on every architecture.
//
// In memory a subset is an AbV: a single growable allocation addressed by
// relative offsets (abv.rs), assembled by the builder chain (build.rs) or
// the canonical planner (canon.rs), encoded and decoded by format0.rs.

mod abv;
mod bitcur;
mod build;
mod canon;
mod cdu;
mod combin;
mod format0;
mod iter;
mod notes;
mod ops;
mod token;


pub use abv::Abv;
pub use build::{Builder, PartitionBuilder, SegmentBuilder};
pub use format0::ValidateFlags;
pub use iter::MemberIter;
pub use ops::{compare, SubsetKey};

pub use ssk_base::{Error, ErrorKind, Result};

// Constants frozen for Format 0.
pub const FORMAT_VERSION: u8 = 0;
pub const CHUNK_BITS: u32 = 64;
pub const K_CHUNK_ENUM_MAX: u32 = 18;
pub const N_BITS_FOR_K: u32 = 6;
pub const DOMINANT_RUN_THRESHOLD: u64 = 96;
pub const RARE_RUN_THRESHOLD: u64 = 64;
pub const MAX_SEGMENT_LEN_HINT: u64 = 2048;
