//! Matroska and WebM.
//!
//! Only the EBML header and the Segment's `Info` and `Tracks` children are
//! materialized. Clusters are skipped by size, or end the walk when their
//! size is unknown.

mod decoder;
pub mod ebml;
pub mod interpret;

pub use decoder::decode;
