//! Rangeprobe - media metadata over ranged reads
//!
//! This library crate exposes the command-line configuration for integration
//! testing. The parsing engine lives in `rangeprobe-media`.

pub mod config;
