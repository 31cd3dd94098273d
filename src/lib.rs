pub mod channel;
pub mod clock;
pub mod config;
pub mod error;
pub mod tcp;


pub use channel::{Channel, Inbound, TunChannel};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{Error, Result};
pub use tcp::{Connection, ConnectionId, Listener};
