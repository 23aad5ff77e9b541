//! ISO base media file format (MP4, MOV, M4A, 3GP).
//!
//! Only the header path `moov > trak > mdia > minf > stbl` is ever read.
//! Media data (`mdat`) and every box not needed for the outstanding fields
//! are skipped without being fetched.

mod atoms;
mod decoder;
pub mod interpret;

pub use atoms::{find_box, BoxIter, BoxType, HandlerType};
pub use decoder::decode;
