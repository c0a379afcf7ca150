//! Persistent storage: the scalable Bloom filter

pub mod bloom;
