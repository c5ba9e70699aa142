// Generic interval polling utility.
//
// Every periodic fetch in the client (new-message polling, the unread
// badge in the binary) goes through this one primitive instead of
// owning its own timer bookkeeping.

use log::debug;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct IntervalPoller {
    handle: JoinHandle<()>,
}

impl IntervalPoller {
    /// Start ticking `tick` every `interval`.
    ///
    /// The first immediate tick of the underlying interval is skipped;
    /// ticks do not overlap because each one is awaited before the next
    /// interval fires. The tick closure owns its own error handling;
    /// a failed fetch must not stop the timer.
    pub fn start<F, Fut>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(interval);
            // Skip the first immediate tick.
            timer.tick().await;
            loop {
                timer.tick().await;
                tick().await;
            }
        });
        IntervalPoller { handle }
    }

    /// Cancel the timer. No further ticks run after this returns.
    pub fn stop(&self) {
        debug!("Stopping interval poller");
        self.handle.abort();
    }
}

impl Drop for IntervalPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
