// Top-level facade over the subset-key codec. Users of the library get the
// whole public surface from here; the subsystem crates stay free to
// rearrange internally.

pub use ssk_codec::{
    compare, Abv, Builder, Error, ErrorKind, MemberIter, PartitionBuilder, Result,
    SegmentBuilder, SubsetKey, ValidateFlags,
};

pub use ssk_codec::{
    CHUNK_BITS, DOMINANT_RUN_THRESHOLD, FORMAT_VERSION, K_CHUNK_ENUM_MAX,
    MAX_SEGMENT_LEN_HINT, N_BITS_FOR_K, RARE_RUN_THRESHOLD,
};
