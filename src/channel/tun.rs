use super::{Channel, Inbound};
use etherparse::{IpNumber, Ipv4HeaderSlice, PacketBuilder, TcpHeaderSlice};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Duration;
use tracing::trace;

const TTL: u8 = 64;

/// Channel over a TUN interface: IPv4 framing is added on send and stripped on
/// receive, everything that is not TCP is skipped.
pub struct TunChannel {
    device: tun_tap::Iface,
    local_addr: Ipv4Addr,
}

impl TunChannel {
    pub fn open(name: &str, local_addr: Ipv4Addr) -> io::Result<Self> {
        let device = tun_tap::Iface::without_packet_info(name, tun_tap::Mode::Tun)?;
        Ok(Self { device, local_addr })
    }

    pub fn name(&self) -> &str {
        self.device.name()
    }

    fn fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor is owned by `self.device` and stays open for
        // as long as the returned borrow of `self`.
        unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) }
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> io::Result<bool> {
        let timeout = match timeout {
            None => PollTimeout::NONE,
            Some(t) => PollTimeout::from(t.as_millis().min(u16::MAX as u128) as u16),
        };
        let mut fds = [PollFd::new(self.fd(), PollFlags::POLLIN)];
        let ready = poll(&mut fds, timeout).map_err(io::Error::from)?;
        Ok(ready > 0)
    }
}

impl Channel for TunChannel {
    fn recv(&self, buf: &mut [u8], timeout: Option<Duration>) -> io::Result<Option<Inbound>> {
        if !self.wait_readable(timeout)? {
            return Ok(None);
        }
        let n = self.device.recv(buf)?;
        let (src, dst, start, end) = match Ipv4HeaderSlice::from_slice(&buf[..n]) {
            Ok(ip) if ip.protocol() == IpNumber::TCP => {
                let end = (ip.total_len() as usize).min(n);
                (ip.source_addr(), ip.destination_addr(), ip.slice().len(), end)
            }
            _ => {
                trace!("skipping non-TCP packet ({} bytes)", n);
                return Ok(None);
            }
        };
        if start > end {
            return Ok(None);
        }
        buf.copy_within(start..end, 0);
        Ok(Some(Inbound {
            src,
            dst,
            len: end - start,
        }))
    }

    fn send(&self, segment: &[u8], dst: Ipv4Addr) -> io::Result<()> {
        let tcp = TcpHeaderSlice::from_slice(segment)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let payload = &segment[tcp.slice().len()..];
        let builder = PacketBuilder::ipv4(self.local_addr.octets(), dst.octets(), TTL)
            .tcp_header(tcp.to_header());
        let mut pkt = Vec::with_capacity(builder.size(payload.len()));
        builder
            .write(&mut pkt, payload)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        self.device.send(&pkt)?;
        Ok(())
    }
}
