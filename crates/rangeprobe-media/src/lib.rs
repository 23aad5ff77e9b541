//! Rangeprobe-Media: streaming container metadata extraction
//!
//! Extracts duration, dimensions, frame rate, rotation and codec strings from
//! MP4/MOV and Matroska/WebM resources while fetching as few bytes as
//! possible. Sources are read through ranged windows, so a remote file's
//! media payload is never downloaded.
//!
//! # Modules
//!
//! - `source` - Byte sources (file, HTTP range/HEAD, in-memory)
//! - `cursor` - Forward-reading window over a byte source
//! - `format` - Container detection from the first bytes
//! - `mp4` - ISO-BMFF box walker and box interpreters
//! - `mkv` - EBML element walker and Matroska interpreters
//! - `track` - Track descriptors, frame rate and timing
//! - `aggregator` - Outstanding-field bookkeeping and partial results
//! - `session` - The parse state machine
//!
//! # Architecture
//!
//! A session runs as one sequential future:
//!
//! 1. The dispatcher peeks the prefix and picks a grammar
//! 2. The decoder walks headers in document order, skipping payloads it
//!    does not need without fetching them
//! 3. Leaf boxes/elements are materialized and interpreted into tracks
//! 4. The aggregator stops the walk as soon as every requested field is
//!    settled, or settles the rest as unavailable when the source ends

pub mod aggregator;
pub mod codec;
pub mod cursor;
pub mod error;
pub mod format;
pub mod mkv;
pub mod mp4;
pub mod request;
pub mod result;
pub mod session;
pub mod source;
pub mod track;
pub mod tree;

pub use error::{Error, ErrorKind, Result};
pub use format::Container;
pub use request::{DimensionPolicy, FieldName, ParseOptions, ParseRequest};
pub use result::{Dimensions, Field, ParseResult, Resolved, Unavailable};
pub use session::{parse_media, probe_bytes, ParseSession, SessionState};
pub use source::{ByteRange, ByteSource};
pub use track::{MediaType, TrackDescriptor};
pub use tree::StructureTree;
