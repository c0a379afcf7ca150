//! Height → block → signature worker pipeline
//!
//! Three stages joined by bounded channels: a single height emitter, a pool
//! of block-fetch workers, and a pool of extract workers. Channel
//! disconnection propagates shutdown in both directions: when a stage's
//! senders are all dropped its output channel closes and the next stage
//! drains out, and when the consumer drops the signature receiver the
//! failing sends unwind the pipeline from the back.

use bitcoin::Block;
use crossbeam_channel::{bounded, Receiver};
use log::warn;
use std::sync::Arc;
use std::thread;

use crate::block::store::BlockStore;
use crate::extractor;
use crate::types::SignatureRecord;

/// Workers fetching blocks from the store. Tuned for spinning-disk stores;
/// any width works.
const FETCH_WORKERS: usize = 11;
/// Workers extracting signatures from fetched blocks
const EXTRACT_WORKERS: usize = 11;

const CHANNEL_CAPACITY: usize = 256;

/// Start the pipeline over heights `0..tip` and return the signature
/// stream. The stream ends when every block has been drained; records
/// across blocks arrive in no particular order.
pub fn signature_stream<S>(store: Arc<S>, tip: u64) -> Receiver<SignatureRecord>
where
    S: BlockStore + 'static,
{
    let (height_tx, height_rx) = bounded::<u64>(CHANNEL_CAPACITY);
    let (block_tx, block_rx) = bounded::<(u64, Block)>(CHANNEL_CAPACITY);
    let (sig_tx, sig_rx) = bounded::<SignatureRecord>(CHANNEL_CAPACITY);

    thread::spawn(move || {
        for height in 0..tip {
            if height_tx.send(height).is_err() {
                return;
            }
        }
    });

    for _ in 0..FETCH_WORKERS {
        let store = Arc::clone(&store);
        let height_rx = height_rx.clone();
        let block_tx = block_tx.clone();

        thread::spawn(move || {
            for height in height_rx {
                let hash = match store.block_hash_at(height) {
                    Ok(hash) => hash,
                    Err(e) => {
                        warn!("failed block hash lookup at height {}: {}", height, e);
                        return;
                    }
                };
                let block = match store.block_by_hash(&hash) {
                    Ok(block) => block,
                    Err(e) => {
                        warn!("failed block fetch {} at height {}: {}", hash, height, e);
                        return;
                    }
                };

                if block_tx.send((height, block)).is_err() {
                    return;
                }
            }
        });
    }
    drop(height_rx);
    drop(block_tx);

    for _ in 0..EXTRACT_WORKERS {
        let block_rx = block_rx.clone();
        let sig_tx = sig_tx.clone();

        thread::spawn(move || {
            for (height, block) in block_rx {
                for record in extractor::extract_signatures(&block, height) {
                    if sig_tx.send(record).is_err() {
                        return;
                    }
                }
            }
        });
    }
    drop(block_rx);
    drop(sig_tx);

    sig_rx
}
