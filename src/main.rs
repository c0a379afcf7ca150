//! Bitcoin ECDSA nonce-reuse scanner CLI

use anyhow::{Context, Result};
use blockchainr::{
    prune_singletons, scan, BlkFileStore, BlockStore, EventStream, ScalingBloom, BLOOM_CAPACITY,
    BLOOM_FP_RATE, TICK_SECS,
};
use clap::Parser;
use log::info;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "blockchainr")]
#[command(about = "Find ECDSA signatures sharing an r value across a local Bitcoin blockchain")]
#[command(version)]
struct Cli {
    /// Path to the Bitcoin blocks directory (containing blk*.dat files)
    #[arg(short, long)]
    datadir: PathBuf,

    /// Output path for the result document
    #[arg(short, long, default_value = "blockchainr.json")]
    output: PathBuf,

    /// Path of the persisted Bloom filter
    #[arg(long, default_value = "blockchainr_bloom.bin")]
    bloom_file: PathBuf,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    info!("indexing block files under {}", cli.datadir.display());
    let store = Arc::new(BlkFileStore::open(&cli.datadir)?);
    info!("block index ready, tip height {}", store.tip_height());

    let mut filter = ScalingBloom::open(BLOOM_CAPACITY, BLOOM_FP_RATE, &cli.bloom_file)?;
    let events = EventStream::new(Duration::from_secs(TICK_SECS))?;

    let mut duplicates = scan(&store, &mut filter, &events)?;
    prune_singletons(&mut duplicates);

    info!("{} duplicated r values", duplicates.len());

    let file = File::create(&cli.output)
        .with_context(|| format!("failed to create {}", cli.output.display()))?;
    serde_json::to_writer(BufWriter::new(file), &duplicates)
        .with_context(|| format!("failed to encode results to {}", cli.output.display()))?;

    Ok(())
}
