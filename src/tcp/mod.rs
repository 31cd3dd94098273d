mod connection;
mod diag;
pub mod flags;
mod listener;
mod rtt;
mod segment;
mod timer;

pub use self::connection::{Connection, ConnectionId, Context, Event, ReceiveCallback, Snapshot, State};
pub use self::diag::{Diagnostics, DropReason};
pub use self::listener::{AcceptCallback, Listener};
pub use self::rtt::RttEstimator;
pub use self::segment::{build, checksum, is_seq_lt, is_seq_lte, verify, SegmentHeader};
pub use self::timer::{Deadline, RetransmitTimer};

pub use self::flags::flags_to_string;
pub use self::flags::{ACK, FIN, PSH, RST, SYN, URG};
