use crate::tcp::ConnectionId;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Why an inbound segment (or part of it) was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// Addressed to a port nobody is bound to
    WrongPort,
    BadChecksum,
    /// Header could not be parsed
    Malformed,
    /// Not a SYN and no connection matches the 4-tuple
    UnknownConnection,
    /// Sequence number differs from the expected one (duplicate or out of order)
    OutOfOrder,
    /// Connection is tearing down or closed
    Closed,
    /// Acknowledges data that was never sent
    InvalidAck,
}

impl DropReason {
    pub const ALL: [DropReason; 7] = [
        DropReason::WrongPort,
        DropReason::BadChecksum,
        DropReason::Malformed,
        DropReason::UnknownConnection,
        DropReason::OutOfOrder,
        DropReason::Closed,
        DropReason::InvalidAck,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::WrongPort => "wrong port",
            DropReason::BadChecksum => "bad checksum",
            DropReason::Malformed => "malformed header",
            DropReason::UnknownConnection => "segment for unknown connection",
            DropReason::OutOfOrder => "out of order",
            DropReason::Closed => "connection closed",
            DropReason::InvalidAck => "ack for unsent data",
        };
        f.write_str(s)
    }
}

/// The single place drop decisions go through: logged, then counted.
#[derive(Debug, Default)]
pub struct Diagnostics {
    drops: [AtomicU64; DropReason::ALL.len()],
}

impl Diagnostics {
    pub fn report(&self, reason: DropReason, id: Option<&ConnectionId>) {
        match id {
            Some(id) => debug!("{} dropping segment: {}", id, reason),
            None => debug!("dropping segment: {}", reason),
        }
        self.drops[reason.index()].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self, reason: DropReason) -> u64 {
        self.drops[reason.index()].load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        DropReason::ALL.iter().map(|r| self.count(*r)).sum()
    }
}
