//! Block store over blk*.dat files
//!
//! Indexes and serves Bitcoin blocks directly from the blk*.dat files using
//! memory mapping. The index follows the best chain from the genesis block;
//! blocks not on that chain are ignored.

use anyhow::{anyhow, Context, Result};
use bitcoin::consensus::Decodable;
use bitcoin::hashes::Hash;
use bitcoin::{Block, BlockHash};
use byteorder::{LittleEndian, ReadBytesExt};
use log::{debug, warn};
use memmap2::Mmap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::MAINNET_MAGIC;

/// Block location in blk*.dat files
#[derive(Debug, Clone)]
struct BlockLocation {
    /// File number (blkXXXXX.dat)
    file_num: u32,
    /// Offset of the block payload within the file
    offset: u64,
    /// Block size in bytes
    size: u32,
}

/// Read access to stored blocks, keyed by height or hash.
///
/// Implementations must support concurrent reads; the fetch workers share
/// one store across threads.
pub trait BlockStore: Send + Sync {
    /// Height above the newest stored block; 0 when the store is empty.
    fn tip_height(&self) -> u64;

    /// Hash of the main-chain block at the given height.
    fn block_hash_at(&self, height: u64) -> Result<BlockHash>;

    /// Fully materialized block for the given hash.
    fn block_by_hash(&self, hash: &BlockHash) -> Result<Block>;
}

/// Block store backed by a directory of blk*.dat files.
pub struct BlkFileStore {
    blocks_dir: PathBuf,
    /// Memory-mapped blk files, populated on demand
    mmaps: RwLock<HashMap<u32, Arc<Mmap>>>,
    heights: HashMap<u64, BlockHash>,
    locations: HashMap<BlockHash, BlockLocation>,
    tip: u64,
}

impl BlkFileStore {
    /// Index the blk*.dat files under `blocks_dir`.
    pub fn open(blocks_dir: &Path) -> Result<Self> {
        if !blocks_dir.is_dir() {
            anyhow::bail!("blocks directory {} does not exist", blocks_dir.display());
        }

        let blocks_dir = blocks_dir.to_path_buf();
        let (heights, locations, tip) = Self::build_index(&blocks_dir)?;

        if tip == 0 {
            warn!("no blocks indexed under {}", blocks_dir.display());
        }

        Ok(Self {
            blocks_dir,
            mmaps: RwLock::new(HashMap::new()),
            heights,
            locations,
            tip,
        })
    }

    fn blk_file_path(&self, file_num: u32) -> PathBuf {
        self.blocks_dir.join(format!("blk{:05}.dat", file_num))
    }

    /// Get the mmap for a blk file, mapping it on first use.
    fn mapped_file(&self, file_num: u32) -> Result<Arc<Mmap>> {
        if let Some(mmap) = self.mmaps.read().get(&file_num) {
            return Ok(Arc::clone(mmap));
        }

        let file_path = self.blk_file_path(file_num);
        let file = File::open(&file_path)
            .with_context(|| format!("failed to open {}", file_path.display()))?;
        let mmap = Arc::new(unsafe { Mmap::map(&file)? });

        // Another worker may have mapped the file meanwhile; keep the first.
        let mut cache = self.mmaps.write();
        Ok(Arc::clone(
            cache.entry(file_num).or_insert(mmap),
        ))
    }

    /// Scan all blk*.dat files and index the chain from genesis.
    fn build_index(
        blocks_dir: &Path,
    ) -> Result<(HashMap<u64, BlockHash>, HashMap<BlockHash, BlockLocation>, u64)> {
        // Every raw block found, keyed by header hash, with its parent hash
        let mut blocks_by_hash: HashMap<BlockHash, (BlockLocation, BlockHash)> = HashMap::new();
        let mut genesis_hash: Option<BlockHash> = None;
        let mut file_num = 0u32;

        loop {
            let file_path = blocks_dir.join(format!("blk{:05}.dat", file_num));
            if !file_path.exists() {
                break;
            }

            debug!("scanning {}", file_path.display());

            let file = File::open(&file_path)?;
            let mmap = unsafe { Mmap::map(&file)? };

            let mut offset = 0usize;

            while offset + 8 < mmap.len() {
                let mut cursor = Cursor::new(&mmap[offset..offset + 8]);
                let magic = cursor.read_u32::<LittleEndian>()?;

                if magic != MAINNET_MAGIC {
                    offset += 1;
                    continue;
                }

                let block_size = cursor.read_u32::<LittleEndian>()?;

                if offset + 8 + block_size as usize > mmap.len() {
                    break;
                }

                let block_start = offset + 8;
                let block_data = &mmap[block_start..block_start + block_size as usize];

                if block_data.len() >= 80 {
                    let mut prev_hash = [0u8; 32];
                    prev_hash.copy_from_slice(&block_data[4..36]);

                    let hash = BlockHash::from_byte_array(double_sha256(&block_data[..80]));

                    let location = BlockLocation {
                        file_num,
                        offset: block_start as u64,
                        size: block_size,
                    };

                    if prev_hash == [0u8; 32] {
                        genesis_hash = Some(hash);
                    }

                    blocks_by_hash.insert(
                        hash,
                        (location, BlockHash::from_byte_array(prev_hash)),
                    );
                }

                offset = block_start + block_size as usize;
            }

            file_num += 1;
        }

        let mut heights = HashMap::new();
        let mut locations = HashMap::new();
        let mut tip = 0u64;

        // Walk the chain from genesis; the first stored candidate wins on forks.
        if let Some(genesis) = genesis_hash {
            let mut next_blocks: HashMap<BlockHash, Vec<BlockHash>> = HashMap::new();
            for (hash, (_, prev_hash)) in &blocks_by_hash {
                next_blocks.entry(*prev_hash).or_default().push(*hash);
            }

            let mut current = genesis;
            let mut height = 0u64;

            while let Some((location, _)) = blocks_by_hash.get(&current) {
                heights.insert(height, current);
                locations.insert(current, location.clone());
                tip = height + 1;

                match next_blocks.get(&current) {
                    Some(candidates) if !candidates.is_empty() => {
                        current = candidates[0];
                        height += 1;
                    }
                    _ => break,
                }
            }
        }

        debug!("indexed {} blocks, tip height {}", heights.len(), tip);

        Ok((heights, locations, tip))
    }
}

impl BlockStore for BlkFileStore {
    fn tip_height(&self) -> u64 {
        self.tip
    }

    fn block_hash_at(&self, height: u64) -> Result<BlockHash> {
        self.heights
            .get(&height)
            .copied()
            .ok_or_else(|| anyhow!("no block indexed at height {}", height))
    }

    fn block_by_hash(&self, hash: &BlockHash) -> Result<Block> {
        let location = self
            .locations
            .get(hash)
            .ok_or_else(|| anyhow!("unknown block {}", hash))?
            .clone();

        let mmap = self.mapped_file(location.file_num)?;

        let start = location.offset as usize;
        let end = start + location.size as usize;

        if end > mmap.len() {
            anyhow::bail!("block {} exceeds file bounds", hash);
        }

        let mut cursor = Cursor::new(&mmap[start..end]);
        Block::consensus_decode(&mut cursor)
            .with_context(|| format!("failed to decode block {}", hash))
    }
}

/// Double SHA256, the block header hash
fn double_sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut result = [0u8; 32];
    result.copy_from_slice(&second);
    result
}
