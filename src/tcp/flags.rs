//! Control bits in their on-the-wire positions (RFC 793).
use etherparse::{TcpHeader, TcpHeaderSlice};

/// FIN flag - no more data from sender
pub const FIN: u8 = 1 << 0;
/// SYN flag - synchronize sequence numbers
pub const SYN: u8 = 1 << 1;
/// RST flag - reset the connection (parsed, never acted upon)
pub const RST: u8 = 1 << 2;
/// PSH flag - push function
pub const PSH: u8 = 1 << 3;
/// ACK flag - acknowledgment field is significant
pub const ACK: u8 = 1 << 4;
/// URG flag - urgent pointer field is significant
pub const URG: u8 = 1 << 5;

/// Flags for human-readable logs, e.g. `SA---`
pub fn flags_to_string(flags: u8) -> String {
    format!(
        "{}{}{}{}{}",
        if flags & SYN != 0 { "S" } else { "-" },
        if flags & ACK != 0 { "A" } else { "-" },
        if flags & FIN != 0 { "F" } else { "-" },
        if flags & RST != 0 { "R" } else { "-" },
        if flags & PSH != 0 { "P" } else { "-" },
    )
}

/// Collect the control bits of a parsed header into a flags byte
pub fn from_header(tcp_hdr: &TcpHeaderSlice) -> u8 {
    (tcp_hdr.fin() as u8)
        | (tcp_hdr.syn() as u8) << 1
        | (tcp_hdr.rst() as u8) << 2
        | (tcp_hdr.psh() as u8) << 3
        | (tcp_hdr.ack() as u8) << 4
        | (tcp_hdr.urg() as u8) << 5
}

/// Set the control bits of `header` from a flags byte.
pub fn apply(header: &mut TcpHeader, flags: u8) {
    header.fin = flags & FIN != 0;
    header.syn = flags & SYN != 0;
    header.rst = flags & RST != 0;
    header.psh = flags & PSH != 0;
    header.ack = flags & ACK != 0;
    header.urg = flags & URG != 0;
}
