//! Reconnect backoff
//!
//! Delays come from a backon exponential schedule: initial delay, doubled per
//! failed cycle, capped. Jitter is added on top of the capped value so
//! several collectors do not reconnect in lockstep. The schedule restarts
//! once a session reaches `Ready`.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};

pub struct ReconnectBackoff {
    builder: ExponentialBuilder,
    delays: ExponentialBackoff,
    max: Duration,
}

impl ReconnectBackoff {
    pub fn new(initial: Duration, max: Duration, jitter: bool) -> Self {
        let max = max.max(initial);
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(initial)
            .with_max_delay(max)
            .with_factor(2.0)
            .without_max_times();
        if jitter {
            builder = builder.with_jitter();
        }

        Self {
            delays: builder.clone().build(),
            builder,
            max,
        }
    }

    /// Delay before the next reconnect attempt
    pub fn next_delay(&mut self) -> Duration {
        // The schedule is unbounded; the fallback is never reached in practice
        self.delays.next().unwrap_or(self.max)
    }

    pub fn reset(&mut self) {
        self.delays = self.builder.clone().build();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(delays: &[u64]) -> Vec<Duration> {
        delays.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(7), false);

        let delays: Vec<Duration> = (0..6).map(|_| backoff.next_delay()).collect();
        assert_eq!(delays, secs(&[1, 2, 4, 7, 7, 7]));
    }

    #[test]
    fn test_schedule_never_runs_out() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(4), false);
        for _ in 0..1000 {
            backoff.next_delay();
        }
        assert_eq!(backoff.next_delay(), Duration::from_secs(4));
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(60), false);
        backoff.next_delay();
        backoff.next_delay();

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_cap_below_initial_is_raised() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(5), Duration::from_secs(1), false);
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
        assert_eq!(backoff.next_delay(), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_one_delay() {
        let mut backoff = ReconnectBackoff::new(Duration::from_secs(1), Duration::from_secs(4), true);

        for base in [1, 2, 4, 4, 4] {
            let delay = backoff.next_delay();
            let base = Duration::from_secs(base);
            assert!(delay >= base && delay <= base * 2, "{:?} outside [{:?}, {:?}]", delay, base, base * 2);
        }
    }
}
