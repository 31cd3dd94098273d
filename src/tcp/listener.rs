use crate::channel::Channel;
use crate::clock::Clock;
use crate::config::Config;
use crate::error::Result;
use crate::tcp::connection::{Connection, ConnectionId, Context, Snapshot};
use crate::tcp::flags::{self, SYN};
use crate::tcp::segment::{self, SegmentHeader};
use crate::tcp::{Diagnostics, DropReason};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::{info, trace, warn};

/// Handler for newly accepted connections.
pub type AcceptCallback = Box<dyn FnMut(&mut Connection) + Send>;

/// Accepts connections on one port and routes segments to them by 4-tuple.
pub struct Listener {
    port: u16,
    ctx: Context,
    connections: HashMap<ConnectionId, Connection>,
    accept_callback: Option<AcceptCallback>,
    conn_counter: u64,
}

impl Listener {
    /// Take every segment `channel` delivers for `port`. No I/O happens here.
    pub fn bind(channel: Arc<dyn Channel>, port: u16, clock: Arc<dyn Clock>, config: Config) -> Self {
        Self {
            port,
            ctx: Context {
                channel,
                clock,
                config: Arc::new(config),
                diag: Arc::new(Diagnostics::default()),
            },
            connections: HashMap::new(),
            accept_callback: None,
            conn_counter: 0,
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn on_accept<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Connection) + Send + 'static,
    {
        self.accept_callback = Some(Box::new(callback));
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.ctx.diag
    }

    pub fn connection(&self, id: &ConnectionId) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn peek_conn(&self, id: &ConnectionId) -> Option<Snapshot> {
        self.connections.get(id).map(|c| c.peek())
    }

    /// Dispatch one inbound segment.
    pub fn receive(&mut self, src: Ipv4Addr, dst: Ipv4Addr, seg: &[u8]) {
        let header = match SegmentHeader::parse(seg) {
            Ok(h) => h,
            Err(e) => {
                trace!("{} → {}: {}", src, dst, e);
                self.ctx.diag.report(DropReason::Malformed, None);
                return;
            }
        };

        if header.dst_port != self.port {
            self.ctx.diag.report(DropReason::WrongPort, None);
            return;
        }

        let id = ConnectionId::inbound(src, dst, &header);

        if self.ctx.channel.enforce_checksum() {
            match segment::verify(seg, src, dst) {
                Ok(true) => {}
                _ => {
                    warn!("{} discarding segment with bad checksum", id);
                    self.ctx.diag.report(DropReason::BadChecksum, Some(&id));
                    return;
                }
            }
        }

        let offset = header.payload_offset().min(seg.len());
        let payload = &seg[offset..];

        if header.has(SYN) {
            self.conn_counter += 1;
            if self.connections.contains_key(&id) {
                info!("{} SYN for existing connection, starting a new incarnation", id);
            } else {
                info!("New connection #{} from {}", self.conn_counter, id);
            }
            let conn = Connection::accept(self.conn_counter, id, header.seq, self.ctx.clone());
            self.connections.insert(id, conn);

            if let (Some(callback), Some(conn)) =
                (self.accept_callback.as_mut(), self.connections.get_mut(&id))
            {
                callback(conn);
            }
            return;
        }

        match self.connections.get_mut(&id) {
            Some(conn) => conn.on_segment(header.seq, header.ack, header.flags, payload),
            None => {
                trace!(
                    "{} flags={} (segment for unknown connection)",
                    id,
                    flags::flags_to_string(header.flags)
                );
                self.ctx.diag.report(DropReason::UnknownConnection, Some(&id));
            }
        }
    }

    /// Fire every retransmission timer that expired by now.
    pub fn poll_timers(&mut self) {
        let now = self.ctx.clock.now();
        for conn in self.connections.values_mut() {
            if conn.deadline().is_some_and(|at| at <= now) {
                conn.on_timer(now);
            }
        }
    }

    /// Wait for at most one segment (bounded by the earliest timer), dispatch
    /// it, then service expired timers.
    pub fn step(&mut self, buf: &mut [u8]) -> Result<()> {
        let now = self.ctx.clock.now();
        let timeout = self
            .connections
            .values()
            .filter_map(|c| c.deadline())
            .min()
            .map(|at| at.saturating_duration_since(now));

        if let Some(inbound) = self.ctx.channel.recv(buf, timeout)? {
            self.receive(inbound.src, inbound.dst, &buf[..inbound.len]);
        }
        self.poll_timers();
        Ok(())
    }

    pub fn run(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.ctx.config.recv_buffer];
        info!("listening on port {}", self.port);
        loop {
            self.step(&mut buf)?;
        }
    }
}
