//! ZIP central directory reading.
//!
//! Only the directory is parsed here: EOCD (and its ZIP64 variant) from the
//! end of the file, then every central file header. That is enough to list
//! an archive, including method codes, AES markers and raw name bytes,
//! without touching entry data.
//!
//! Entry data is decoded by the `zip` crate in the native backend.

mod parser;
mod structures;

pub use parser::ZipParser;
pub use structures::*;
