//! Per-pass progress counters and reporting

use log::info;
use std::time::Instant;

/// Running counters for one pass of the pipeline.
///
/// The tick line reports the signatures seen since the last tick alongside
/// the cumulative totals; a user signal reports the same numbers without
/// resetting the window.
pub struct PassStats {
    step: u32,
    matches: u64,
    total_sigs: u64,
    window_start: Instant,
    window_mark: u64,
}

impl PassStats {
    pub fn new(step: u32) -> Self {
        Self {
            step,
            matches: 0,
            total_sigs: 0,
            window_start: Instant::now(),
            window_mark: 0,
        }
    }

    /// Count one consumed signature record.
    pub fn record(&mut self) {
        self.total_sigs += 1;
    }

    /// Count one match (a flagged candidate in pass 1, a recorded
    /// occurrence in pass 2).
    pub fn matched(&mut self) {
        self.matches += 1;
    }

    pub fn matches(&self) -> u64 {
        self.matches
    }

    pub fn total_sigs(&self) -> u64 {
        self.total_sigs
    }

    /// Periodic progress line; resets the reporting window.
    pub fn log_tick(&mut self, height: u64, tip: u64) {
        info!(
            "step {} - {} sigs in {:.2}s, {} matches, {} total, block {} of {}",
            self.step,
            self.total_sigs - self.window_mark,
            self.window_start.elapsed().as_secs_f64(),
            self.matches,
            self.total_sigs,
            height,
            tip
        );
        self.window_start = Instant::now();
        self.window_mark = self.total_sigs;
    }

    /// Signal-triggered progress line; the window keeps running.
    pub fn log_signal(&self, signal: i32, height: u64, tip: u64) {
        info!(
            "step {} - signal {} - {} sigs in {:.2}s, {} matches, {} total, block {} of {}",
            self.step,
            signal,
            self.total_sigs - self.window_mark,
            self.window_start.elapsed().as_secs_f64(),
            self.matches,
            self.total_sigs,
            height,
            tip
        );
    }

    /// One-line summary at the end of a completed pass.
    pub fn log_summary(&self) {
        info!(
            "step {} done - {} signatures processed - {} matches",
            self.step, self.total_sigs, self.matches
        );
    }
}
