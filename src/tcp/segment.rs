//! Segment codec and sequence number arithmetic
use crate::error::{Error, Result};
use crate::tcp::{flags, ConnectionId};
use etherparse::{TcpHeader, TcpHeaderSlice};
use std::net::Ipv4Addr;

/// Determines if sequence number `a` is strictly less than sequence number `b`,
/// accounting for TCP sequence number wrapping.
///
/// TCP sequence numbers are 32-bit unsigned integers that wrap around to 0
/// after reaching 2^32 - 1, so `a < b` holds when `b - a` is positive in
/// 32-bit signed arithmetic (RFC 1323).
///
/// # Examples
///
/// ```
/// use streamwire::tcp::is_seq_lt;
/// assert!(is_seq_lt(100, 200));
/// // 10 comes after 4_294_967_290 in sequence space
/// assert!(is_seq_lt(4_294_967_290, 10));
/// assert!(!is_seq_lt(200, 100));
/// ```
pub fn is_seq_lt(a: u32, b: u32) -> bool {
    (b.wrapping_sub(a) as i32) > 0
}

/// Wrapping-aware `a <= b`.
///
/// ```
/// use streamwire::tcp::is_seq_lte;
/// assert!(is_seq_lte(100, 100));
/// assert!(is_seq_lte(4_294_967_290, 10));
/// assert!(!is_seq_lte(200, 100));
/// ```
pub fn is_seq_lte(a: u32, b: u32) -> bool {
    a == b || is_seq_lt(a, b)
}

/// The fixed part of a parsed segment header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub flags: u8,
    /// Header length in 32-bit words
    pub data_offset: u8,
    pub window: u16,
    pub checksum: u16,
    pub urgent_ptr: u16,
}

impl SegmentHeader {
    pub fn parse(segment: &[u8]) -> Result<Self> {
        let tcp = TcpHeaderSlice::from_slice(segment).map_err(|e| Error::Malformed(e.to_string()))?;
        Ok(SegmentHeader {
            src_port: tcp.source_port(),
            dst_port: tcp.destination_port(),
            seq: tcp.sequence_number(),
            ack: tcp.acknowledgment_number(),
            flags: flags::from_header(&tcp),
            data_offset: tcp.data_offset(),
            window: tcp.window_size(),
            checksum: tcp.checksum(),
            urgent_ptr: tcp.urgent_pointer(),
        })
    }

    /// Offset of the first payload byte.
    pub fn payload_offset(&self) -> usize {
        4 * self.data_offset as usize
    }

    pub fn has(&self, flag: u8) -> bool {
        self.flags & flag != 0
    }
}

/// Checksum `segment` must carry when travelling from `src` to `dst`, computed
/// over the pseudo-header, the header (minus its checksum field) and the payload.
pub fn checksum(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Result<u16> {
    let tcp = TcpHeaderSlice::from_slice(segment).map_err(|e| Error::Malformed(e.to_string()))?;
    let payload = &segment[tcp.slice().len()..];
    tcp.to_header()
        .calc_checksum_ipv4_raw(src.octets(), dst.octets(), payload)
        .map_err(|_| Error::PayloadTooLarge(payload.len()))
}

/// Whether the carried checksum matches the computed one.
pub fn verify(segment: &[u8], src: Ipv4Addr, dst: Ipv4Addr) -> Result<bool> {
    let header = SegmentHeader::parse(segment)?;
    Ok(checksum(segment, src, dst)? == header.checksum)
}

/// Build a segment travelling from the local to the remote end of `id`, with
/// the checksum already fixed.
pub fn build(id: &ConnectionId, seq: u32, ack: u32, fgs: u8, window: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let mut header = TcpHeader::new(id.local_port, id.remote_port, seq, window);
    flags::apply(&mut header, fgs);
    header.acknowledgment_number = ack;
    header.checksum = header
        .calc_checksum_ipv4_raw(id.local_addr.octets(), id.remote_addr.octets(), payload)
        .map_err(|_| Error::PayloadTooLarge(payload.len()))?;

    let mut segment = Vec::with_capacity(header.header_len() as usize + payload.len());
    header.write(&mut segment)?;
    segment.extend_from_slice(payload);
    Ok(segment)
}
