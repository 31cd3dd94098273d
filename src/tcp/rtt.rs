use std::time::Duration;

const ALPHA: f64 = 0.125; // weight of a new sample in the smoothed RTT
const BETA: f64 = 0.25; // weight of a new deviation in the RTT variance

/// Exponentially weighted round-trip time estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RttEstimator {
    estimate: Option<Duration>,
    deviation: Duration,
}

impl RttEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fresh sample in and return the new (unbounded) timeout.
    pub fn sample(&mut self, rtt: Duration) -> Duration {
        match self.estimate {
            None => {
                self.estimate = Some(rtt);
                self.deviation = rtt / 2;
            }
            Some(estimate) => {
                let sample = rtt.as_secs_f64();
                let estimate = (1.0 - ALPHA) * estimate.as_secs_f64() + ALPHA * sample;
                let deviation =
                    (1.0 - BETA) * self.deviation.as_secs_f64() + BETA * (sample - estimate).abs();
                self.estimate = Some(Duration::from_secs_f64(estimate));
                self.deviation = Duration::from_secs_f64(deviation);
            }
        }
        self.timeout().unwrap_or_default()
    }

    /// `estimate + 4 * deviation`, or `None` before the first sample.
    pub fn timeout(&self) -> Option<Duration> {
        self.estimate.map(|estimate| estimate + 4 * self.deviation)
    }

    pub fn estimate(&self) -> Option<Duration> {
        self.estimate
    }

    pub fn deviation(&self) -> Duration {
        self.deviation
    }
}
