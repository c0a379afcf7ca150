//! Ticker and OS-signal event multiplexing
//!
//! The pipeline consumer polls one of these streams non-blockingly per
//! consumed record: progress signals and ticks produce a report, interrupt
//! signals end the scan early.

use anyhow::Result;
use crossbeam_channel::{bounded, tick, Receiver, TrySendError};
use signal_hook::consts::signal::{SIGINT, SIGTERM, SIGUSR1};
use signal_hook::iterator::Signals;
use std::thread;
use std::time::{Duration, Instant};

/// A pending event observed between records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// An OS signal arrived (SIGINT, SIGTERM, or SIGUSR1)
    Signal(i32),
    /// The periodic progress ticker fired
    Tick,
}

/// Whether a signal asks the scan to stop rather than report.
pub fn is_termination(signal: i32) -> bool {
    signal == SIGINT || signal == SIGTERM
}

/// Non-blocking source of ticker and signal events.
pub struct EventStream {
    signals: Receiver<i32>,
    ticker: Receiver<Instant>,
}

impl EventStream {
    /// Install the OS signal handler and start the ticker.
    pub fn new(tick_period: Duration) -> Result<Self> {
        let (signal_tx, signal_rx) = bounded(1);
        let mut signals = Signals::new([SIGINT, SIGTERM, SIGUSR1])?;

        thread::spawn(move || {
            for signal in signals.forever() {
                match signal_tx.try_send(signal) {
                    // A still-pending signal keeps its slot; drop the new one.
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => break,
                }
            }
        });

        Ok(Self {
            signals: signal_rx,
            ticker: tick(tick_period),
        })
    }

    /// Build a stream from explicit channels. Used by tests to inject
    /// signals deterministically.
    pub fn from_parts(signals: Receiver<i32>, ticker: Receiver<Instant>) -> Self {
        Self { signals, ticker }
    }

    /// Return one pending event if there is any, signals first.
    pub fn poll(&self) -> Option<Event> {
        if let Ok(signal) = self.signals.try_recv() {
            return Some(Event::Signal(signal));
        }
        if self.ticker.try_recv().is_ok() {
            return Some(Event::Tick);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{never, unbounded};

    #[test]
    fn test_poll_empty_is_none() {
        let (_signal_tx, signal_rx) = unbounded();
        let events = EventStream::from_parts(signal_rx, never());

        assert_eq!(events.poll(), None);
    }

    #[test]
    fn test_poll_prefers_signal_over_tick() {
        let (signal_tx, signal_rx) = unbounded();
        let (tick_tx, tick_rx) = unbounded();
        let events = EventStream::from_parts(signal_rx, tick_rx);

        signal_tx.send(SIGUSR1).unwrap();
        tick_tx.send(Instant::now()).unwrap();

        assert_eq!(events.poll(), Some(Event::Signal(SIGUSR1)));
        assert_eq!(events.poll(), Some(Event::Tick));
        assert_eq!(events.poll(), None);
    }

    #[test]
    fn test_termination_signals() {
        assert!(is_termination(SIGINT));
        assert!(is_termination(SIGTERM));
        assert!(!is_termination(SIGUSR1));
    }
}
