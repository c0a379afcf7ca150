//! Bitcoin ECDSA nonce-reuse scanner library
//!
//! Scans a locally stored Bitcoin blockchain for ECDSA signatures that
//! share an r value across distinct signing operations. Two passes over
//! the chain keep memory proportional to the number of duplicate
//! candidates rather than the number of signatures: pass 1 flags probable
//! duplicates through a scalable Bloom filter, pass 2 collects every
//! occurrence of the flagged values.

pub mod block;
pub mod extractor;
pub mod scan;
pub mod stats;
pub mod storage;
pub mod types;

pub use block::store::{BlkFileStore, BlockStore};
pub use scan::events::EventStream;
pub use scan::{prune_singletons, scan, MatchTable};
pub use storage::bloom::ScalingBloom;
pub use types::{RValue, SignatureRecord};

/// Magic bytes for Bitcoin mainnet block files
pub const MAINNET_MAGIC: u32 = 0xD9B4BEF9;

/// Expected number of distinct r values on a mainnet snapshot
pub const BLOOM_CAPACITY: u64 = 100_000_000;

/// Per-insert false-positive rate. At ~500M signatures this flags a few
/// million candidates, small enough for the exact in-memory set.
pub const BLOOM_FP_RATE: f64 = 0.005;

/// Seconds between periodic progress reports
pub const TICK_SECS: u64 = 10;
