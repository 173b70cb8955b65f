//! Fixed-cadence refresh loops for live displays.
//!
//! A ticker calls its closure on a background thread until cancelled or
//! dropped. Tickers recompute display values only; they hold snapshots,
//! never the store itself.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cadence of elapsed-time counters
pub const CLOCK_REFRESH: Duration = Duration::from_secs(1);
/// Cadence of the savings counters
pub const STATS_REFRESH: Duration = Duration::from_millis(100);

pub struct Ticker {
    stop: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Run `tick` immediately and then once per `interval`
    ///
    /// `tick` receives the tick number, starting at 0, and returns `false`
    /// to stop the loop on its own.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> std::io::Result<Self>
    where
        F: FnMut(u64) -> bool + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("vapetrack-ticker".into())
            .spawn(move || {
                let mut n = 0u64;
                loop {
                    if !tick(n) {
                        break;
                    }
                    n += 1;
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }

    /// Stop the loop and wait for the thread to exit
    pub fn cancel(mut self) {
        self.shutdown();
    }

    /// Wait for a ticker that stops itself
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Ticker thread panicked");
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Ticker thread panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
