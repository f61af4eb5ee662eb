use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

/// A repeating timer with deterministic cancellation: once `cancel` returns,
/// `tick` can never resolve again, so nothing scheduled off it fires stale.
pub(crate) struct Ticker {
    interval: Option<Interval>,
}

impl Ticker {
    pub(crate) fn stopped() -> Ticker {
        Ticker { interval: None }
    }

    /// (Re)arm the ticker. The first tick lands one full period out.
    pub(crate) fn start(&mut self, period: Duration) {
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.interval = Some(interval);
    }

    pub(crate) fn cancel(&mut self) {
        self.interval = None;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.interval.is_some()
    }

    /// Resolves on the next tick; pends forever while cancelled.
    pub(crate) async fn tick(&mut self) -> Instant {
        match &mut self.interval {
            Some(interval) => interval.tick().await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_at_the_requested_period() {
        let mut ticker = Ticker::stopped();
        ticker.start(Duration::from_millis(25));
        let t0 = Instant::now();
        ticker.tick().await;
        ticker.tick().await;
        assert_eq!((Instant::now() - t0).as_millis(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_ticker_never_fires() {
        let mut ticker = Ticker::stopped();
        ticker.start(Duration::from_millis(10));
        ticker.cancel();
        assert!(!ticker.is_running());
        let fired = tokio::select! {
            _ = ticker.tick() => true,
            _ = time::sleep(Duration::from_secs(1)) => false,
        };
        assert!(!fired);
    }
}
