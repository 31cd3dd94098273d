use std::io;

/// Errors raised by the segment codec and the channel plumbing.
///
/// Protocol anomalies (wrong port, stale sequence numbers, ...) are not errors:
/// they are dropped and reported through [`crate::tcp::Diagnostics`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed segment: {0}")]
    Malformed(String),

    #[error("payload of {0} bytes does not fit in a segment")]
    PayloadTooLarge(usize),

    #[error("channel i/o: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
