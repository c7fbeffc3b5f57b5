mod error;

pub use error::{codec_err, err, Error, ErrorKind, Result};
