use std::time::Duration;

/// Tunable protocol constants shared by a listener and its connections.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum payload carried by a single segment.
    pub mss: usize,
    /// Receive window advertised in every outgoing segment.
    pub window: u16,
    /// Retransmission timeout used until the first RTT sample arrives.
    pub initial_rto: Duration,
    /// Lower bound for the computed retransmission timeout.
    pub min_rto: Duration,
    /// Upper bound for the computed retransmission timeout.
    pub max_rto: Duration,
    /// Size of the buffer the run loop reads segments into.
    pub recv_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mss: 1460,
            window: 65_535, // max unscaled window
            initial_rto: Duration::from_secs(1),
            min_rto: Duration::from_millis(200),
            max_rto: Duration::from_secs(60),
            recv_buffer: 1504, // MTU + 4 bytes for headroom
        }
    }
}

impl Config {
    pub fn clamp_rto(&self, rto: Duration) -> Duration {
        rto.clamp(self.min_rto, self.max_rto)
    }
}
