//! Two-pass duplicate-r scan
//!
//! Pass 1 runs every signature through the scalable Bloom filter and
//! collects the flagged r values into an exact candidate set. Pass 2
//! re-traverses the chain and records every occurrence of a candidate,
//! including the first sighting pass 1 could not keep. Candidates that end
//! up with a single occurrence were Bloom false positives and are pruned.

pub mod events;
pub mod pipeline;

use anyhow::Result;
use log::warn;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::block::store::BlockStore;
use crate::stats::PassStats;
use crate::storage::bloom::ScalingBloom;
use crate::types::SignatureRecord;
use events::{Event, EventStream};

/// Duplicated r values (decimal form) mapped to their occurrences in
/// arrival order.
pub type MatchTable = HashMap<String, Vec<SignatureRecord>>;

/// Run both passes over the full chain and return the match table.
///
/// An interrupt signal ends the current pass and returns whatever has been
/// matched so far (nothing if pass 1 was interrupted); the Bloom filter is
/// flushed to its backing file either way.
pub fn scan<S>(
    store: &Arc<S>,
    filter: &mut ScalingBloom,
    events: &EventStream,
) -> Result<MatchTable>
where
    S: BlockStore + 'static,
{
    let tip = store.tip_height();

    let mut candidates: HashSet<String> = HashSet::new();
    let mut matches: MatchTable = HashMap::new();

    for step in 1..=2u32 {
        let mut stats = PassStats::new(step);
        let mut interrupted = false;

        let records = pipeline::signature_stream(Arc::clone(store), tip);
        for record in records.iter() {
            match events.poll() {
                Some(Event::Signal(signal)) => {
                    stats.log_signal(signal, record.height, tip);
                    if events::is_termination(signal) {
                        interrupted = true;
                    }
                }
                Some(Event::Tick) => stats.log_tick(record.height, tip),
                None => {}
            }

            if interrupted {
                break;
            }

            if step == 1 {
                if filter.check(record.r.as_bytes()) {
                    stats.matched();
                    candidates.insert(record.r.to_decimal());
                } else if !filter.add(record.r.as_bytes()) {
                    warn!("bloom filter add failed");
                }
            } else {
                let key = record.r.to_decimal();
                if candidates.contains(&key) {
                    stats.matched();
                    matches.entry(key).or_default().push(record);
                }
            }

            stats.record();
        }

        // The backing file must reflect every add once the pass is over,
        // interrupted or not.
        filter.save()?;

        if interrupted {
            return Ok(matches);
        }

        stats.log_summary();
    }

    Ok(matches)
}

/// Drop every entry with a single occurrence; those candidates were Bloom
/// false positives, not duplicates.
pub fn prune_singletons(matches: &mut MatchTable) {
    matches.retain(|_, records| records.len() > 1);
}
