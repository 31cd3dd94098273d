mod tun;

pub use self::tun::TunChannel;

// Mock channel for testing
#[cfg(test)]
pub mod mock;
#[cfg(test)]
pub use self::mock::MockChannel;

use std::io;
use std::net::Ipv4Addr;
use std::time::Duration;

/// A TCP segment the channel copied into the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub len: usize,
}

/// Raw segment delivery between hosts. Delivery may lose segments.
pub trait Channel: Send + Sync {
    /// Wait up to `timeout` (forever if `None`) for the next segment and copy it
    /// into `buf`. `Ok(None)` means nothing arrived in time.
    fn recv(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<Inbound>>;

    /// Hand a complete segment (header + payload) to the network.
    fn send(&self, segment: &[u8], dst: Ipv4Addr) -> io::Result<()>;

    /// Whether inbound checksums must be validated.
    fn enforce_checksum(&self) -> bool {
        true
    }
}
