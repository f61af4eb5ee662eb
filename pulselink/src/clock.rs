use std::time::{SystemTime, UNIX_EPOCH};

use tokio::time::Instant;

pub trait Clock: Send + Sync {
    /// Monotonic scheduling time in fractional seconds. Has no meaning on
    /// any other device.
    fn audio_now(&self) -> f64;

    /// System wall clock in milliseconds since the unix epoch. Comparable
    /// across devices only after offset correction.
    fn wall_now_ms(&self) -> f64;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn audio_now(&self) -> f64 {
        (Instant::now() - self.origin).as_secs_f64()
    }

    fn wall_now_ms(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64() * 1000.0,
            Err(_) => 0.0,
        }
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Mutex;

    use super::Clock;

    // Both clocks advance in lockstep so wall-vs-audio conversions stay
    // consistent within a test.
    pub(crate) struct TestClock {
        now: Mutex<(f64, f64)>,
    }

    impl TestClock {
        pub(crate) fn new(audio: f64, wall_ms: f64) -> TestClock {
            TestClock {
                now: Mutex::new((audio, wall_ms)),
            }
        }

        pub(crate) fn advance(&self, secs: f64) {
            let mut now = self.now.lock().unwrap();
            now.0 += secs;
            now.1 += secs * 1000.0;
        }
    }

    impl Clock for TestClock {
        fn audio_now(&self) -> f64 {
            self.now.lock().unwrap().0
        }

        fn wall_now_ms(&self) -> f64 {
            self.now.lock().unwrap().1
        }
    }
}
