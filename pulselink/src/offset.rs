use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept per remote peer.
pub(crate) const WINDOW_CAPACITY: usize = 20;

/// Pings sent back-to-back right after connecting, for fast convergence.
pub(crate) const BURST_COUNT: u32 = 10;
pub(crate) const BURST_SPACING: Duration = Duration::from_millis(200);

/// Ping period once the burst has drained.
pub(crate) const STEADY_PERIOD: Duration = Duration::from_secs(2);

/// One ping/pong measurement. `offset_ms` is host wall clock minus local
/// wall clock, so `local = host - offset`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OffsetSample {
    pub offset_ms: f64,
    pub rtt_ms: f64,
    pub at_ms: f64,
}

/// Bounded sliding window of offset samples for one remote peer.
#[derive(Debug, Default)]
pub(crate) struct OffsetWindow {
    samples: VecDeque<OffsetSample>,
}

impl OffsetWindow {
    pub(crate) fn new() -> OffsetWindow {
        OffsetWindow {
            samples: VecDeque::with_capacity(WINDOW_CAPACITY),
        }
    }

    /// Fold one exchange into the window: `t0` sent locally, `t1` stamped by
    /// the host, `t3` the local receive time.
    pub(crate) fn record(&mut self, t0: f64, t1: f64, t3: f64) -> OffsetSample {
        let rtt = t3 - t0;
        let sample = OffsetSample {
            offset_ms: t1 - (t0 + rtt / 2.0),
            rtt_ms: rtt,
            at_ms: t3,
        };
        if self.samples.len() == WINDOW_CAPACITY {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        sample
    }

    /// The authoritative offset: the sample with the lowest RTT. A fast
    /// round trip saw the least queueing, so its midpoint bounds the true
    /// clock difference tightest. Never an average.
    pub(crate) fn best(&self) -> Option<f64> {
        self.samples
            .iter()
            .min_by(|a, b| {
                a.rtt_ms
                    .partial_cmp(&b.rtt_ms)
                    .unwrap_or(Ordering::Equal)
            })
            .map(|s| s.offset_ms)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.samples.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.samples.len()
    }
}
