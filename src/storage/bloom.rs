//! Scalable Bloom filter with file persistence
//!
//! Binary format:
//! Header:
//!   magic: u32 = 0x53424C4D ("SBLM")
//!   version: u32 = 1
//!   initial_capacity: u64
//!   fp_rate: f64
//!   num_strata: u32
//!
//! Per stratum:
//!   capacity: u64
//!   inserted: u64
//!   bit_size: u64
//!   num_hashes: u32
//!   bits: [u8; bit_size / 8]

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const BLOOM_MAGIC: u32 = 0x53424C4D; // "SBLM"
const BLOOM_VERSION: u32 = 1;

/// Each stratum added doubles the previous capacity.
const GROWTH_FACTOR: u64 = 2;
/// Each stratum tightens the false-positive budget so the aggregate rate
/// stays bounded as the filter grows.
const TIGHTENING_RATIO: f64 = 0.9;

/// One classic Bloom filter stratum
struct Stratum {
    bits: Vec<u8>,
    bit_size: u64,
    num_hashes: u32,
    inserted: u64,
    capacity: u64,
}

impl Stratum {
    /// Size a stratum for `capacity` elements at the given false-positive
    /// rate: m = -n * ln(p) / (ln 2)^2, k = (m/n) * ln 2.
    fn with_capacity(capacity: u64, fp_rate: f64) -> Self {
        let n = capacity.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;

        let m = (-n * fp_rate.ln() / (ln2 * ln2)).ceil() as u64;
        let m = ((m + 7) / 8) * 8;
        let m = m.max(8);

        let k = ((m as f64 / n) * ln2).round() as u32;
        let k = k.max(1);

        Self {
            bits: vec![0u8; (m / 8) as usize],
            bit_size: m,
            num_hashes: k,
            inserted: 0,
            capacity: capacity.max(1),
        }
    }

    fn is_full(&self) -> bool {
        self.inserted >= self.capacity
    }

    fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_pair(key);

        for i in 0..self.num_hashes {
            let bit_index = bit_index(h1, h2, i, self.bit_size);
            let byte_index = (bit_index / 8) as usize;
            let bit_offset = (bit_index % 8) as u8;
            self.bits[byte_index] |= 1 << bit_offset;
        }

        self.inserted += 1;
    }

    fn contains(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);

        for i in 0..self.num_hashes {
            let bit_index = bit_index(h1, h2, i, self.bit_size);
            let byte_index = (bit_index / 8) as usize;
            let bit_offset = (bit_index % 8) as u8;
            if (self.bits[byte_index] & (1 << bit_offset)) == 0 {
                return false;
            }
        }

        true
    }
}

/// Hash pair for double hashing, from one SHA-256 pass over the key
fn hash_pair(key: &[u8]) -> (u64, u64) {
    let hash = Sha256::digest(key);
    let h1 = u64::from_le_bytes(hash[0..8].try_into().unwrap());
    let h2 = u64::from_le_bytes(hash[8..16].try_into().unwrap());
    (h1, h2)
}

/// h(i) = h1 + i * h2, reduced to the stratum's bit range
fn bit_index(h1: u64, h2: u64, i: u32, bit_size: u64) -> u64 {
    h1.wrapping_add((i as u64).wrapping_mul(h2)) % bit_size
}

/// Append-only approximate set of byte-string keys that grows past its
/// configured capacity by adding strata.
///
/// `check` never reports false for a key previously added; false positives
/// stay near the configured rate. The filter is backed by a named file so
/// repeated runs can reuse it.
pub struct ScalingBloom {
    strata: Vec<Stratum>,
    initial_capacity: u64,
    fp_rate: f64,
    path: PathBuf,
}

impl ScalingBloom {
    /// Open the filter at `path`, reloading a previous run's contents when
    /// the file exists.
    pub fn open(capacity: u64, fp_rate: f64, path: &Path) -> Result<Self> {
        if path.exists() {
            let filter = Self::load(path)?;
            debug!(
                "reloaded bloom filter from {} ({} keys)",
                path.display(),
                filter.inserted()
            );
            return Ok(filter);
        }

        Ok(Self {
            strata: Vec::new(),
            initial_capacity: capacity,
            fp_rate,
            path: path.to_path_buf(),
        })
    }

    /// Approximate membership test. False positives are possible, false
    /// negatives are not.
    pub fn check(&self, key: &[u8]) -> bool {
        self.strata.iter().any(|stratum| stratum.contains(key))
    }

    /// Insert a key, allocating a new stratum when the active one is
    /// saturated. Returns whether the insert took effect.
    pub fn add(&mut self, key: &[u8]) -> bool {
        match self.strata.last_mut() {
            Some(stratum) if !stratum.is_full() => stratum.insert(key),
            _ => {
                let mut stratum = self.next_stratum();
                stratum.insert(key);
                self.strata.push(stratum);
            }
        }

        true
    }

    /// Total keys inserted across all strata.
    pub fn inserted(&self) -> u64 {
        self.strata.iter().map(|stratum| stratum.inserted).sum()
    }

    fn next_stratum(&self) -> Stratum {
        let n = self.strata.len() as u32;
        let capacity = self.initial_capacity.max(1).saturating_mul(GROWTH_FACTOR.pow(n));
        let fp_rate = self.fp_rate * TIGHTENING_RATIO.powi(n as i32);
        Stratum::with_capacity(capacity, fp_rate)
    }

    /// Write the filter to its backing file.
    pub fn save(&self) -> Result<()> {
        let file = File::create(&self.path)
            .with_context(|| format!("failed to create bloom file {}", self.path.display()))?;
        let mut writer = BufWriter::new(file);

        writer.write_u32::<LittleEndian>(BLOOM_MAGIC)?;
        writer.write_u32::<LittleEndian>(BLOOM_VERSION)?;
        writer.write_u64::<LittleEndian>(self.initial_capacity)?;
        writer.write_f64::<LittleEndian>(self.fp_rate)?;
        writer.write_u32::<LittleEndian>(self.strata.len() as u32)?;

        for stratum in &self.strata {
            writer.write_u64::<LittleEndian>(stratum.capacity)?;
            writer.write_u64::<LittleEndian>(stratum.inserted)?;
            writer.write_u64::<LittleEndian>(stratum.bit_size)?;
            writer.write_u32::<LittleEndian>(stratum.num_hashes)?;
            writer.write_all(&stratum.bits)?;
        }

        writer.flush()?;

        debug!(
            "saved bloom filter to {} ({} keys, {} strata)",
            self.path.display(),
            self.inserted(),
            self.strata.len()
        );

        Ok(())
    }

    fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("failed to open bloom file {}", path.display()))?;
        let mut reader = BufReader::new(file);

        let magic = reader.read_u32::<LittleEndian>()?;
        if magic != BLOOM_MAGIC {
            anyhow::bail!(
                "invalid bloom file magic: expected 0x{:08X}, got 0x{:08X}",
                BLOOM_MAGIC,
                magic
            );
        }

        let version = reader.read_u32::<LittleEndian>()?;
        if version != BLOOM_VERSION {
            anyhow::bail!("unsupported bloom file version: {}", version);
        }

        let initial_capacity = reader.read_u64::<LittleEndian>()?;
        let fp_rate = reader.read_f64::<LittleEndian>()?;
        let num_strata = reader.read_u32::<LittleEndian>()?;

        let mut strata = Vec::with_capacity(num_strata as usize);
        for _ in 0..num_strata {
            let capacity = reader.read_u64::<LittleEndian>()?;
            let inserted = reader.read_u64::<LittleEndian>()?;
            let bit_size = reader.read_u64::<LittleEndian>()?;
            let num_hashes = reader.read_u32::<LittleEndian>()?;

            let mut bits = vec![0u8; (bit_size / 8) as usize];
            reader.read_exact(&mut bits)?;

            strata.push(Stratum {
                bits,
                bit_size,
                num_hashes,
                inserted,
                capacity,
            });
        }

        Ok(Self {
            strata,
            initial_capacity,
            fp_rate,
            path: path.to_path_buf(),
        })
    }
}
