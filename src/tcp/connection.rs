use crate::channel::Channel;
use crate::clock::Clock;
use crate::config::Config;
use crate::tcp::flags::{self, ACK, FIN, SYN};
use crate::tcp::rtt::RttEstimator;
use crate::tcp::segment::{self, is_seq_lt, is_seq_lte, SegmentHeader};
use crate::tcp::timer::RetransmitTimer;
use crate::tcp::{Diagnostics, DropReason};
use std::collections::VecDeque;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// The 4-tuple a connection is keyed by, seen from the local side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    pub remote_addr: Ipv4Addr,
    pub remote_port: u16,
    pub local_addr: Ipv4Addr,
    pub local_port: u16,
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} → {}:{}",
            self.remote_addr, self.remote_port, self.local_addr, self.local_port
        )
    }
}

impl ConnectionId {
    pub fn new(remote_addr: Ipv4Addr, remote_port: u16, local_addr: Ipv4Addr, local_port: u16) -> Self {
        ConnectionId {
            remote_addr,
            remote_port,
            local_addr,
            local_port,
        }
    }

    /// Identify the connection an inbound segment belongs to.
    pub fn inbound(src: Ipv4Addr, dst: Ipv4Addr, header: &SegmentHeader) -> Self {
        ConnectionId::new(src, header.src_port, dst, header.dst_port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// SYN+ACK sent, not yet acknowledged
    HandshakeSent,
    Established,
    /// A timeout fired since the last application send: no RTT samples, no
    /// window growth until the application sends again
    Retransmitting,
    /// FIN sent, waiting for it to be acknowledged
    Closing,
    Closed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::HandshakeSent => write!(f, "HANDSHAKE-SENT"),
            State::Established => write!(f, "ESTABLISHED"),
            State::Retransmitting => write!(f, "RETRANSMITTING"),
            State::Closing => write!(f, "CLOSING"),
            State::Closed => write!(f, "CLOSED"),
        }
    }
}

impl State {
    pub fn on_event(self, ev: Event) -> Option<State> {
        use Event::*;
        use State::*;
        match (self, ev) {
            (HandshakeSent, SynAcked) => Some(Established),
            (Established, Timeout) => Some(Retransmitting),
            (Retransmitting, Send) => Some(Established),
            (HandshakeSent | Established | Retransmitting, Close) => Some(Closing),
            (Closing, FinAcked) => Some(Closed),
            _ => None,
        }
    }

    /// Whether the application may still send and receive.
    pub fn is_open(self) -> bool {
        matches!(self, State::HandshakeSent | State::Established | State::Retransmitting)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    SynAcked, // our SYN+ACK got acknowledged
    Timeout,  // retransmission timer fired
    Send,     // application send
    Close,    // application close or peer FIN
    FinAcked, // our FIN got acknowledged
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::SynAcked => write!(f, "SYN_ACKED"),
            Event::Timeout => write!(f, "TIMEOUT"),
            Event::Send => write!(f, "SEND"),
            Event::Close => write!(f, "CLOSE"),
            Event::FinAcked => write!(f, "FIN_ACKED"),
        }
    }
}

/// Handler for data arriving on a connection. An empty payload signals end
/// of stream.
pub type ReceiveCallback = Box<dyn FnMut(&mut Connection, &[u8]) + Send>;

/// What every connection of a listener shares.
#[derive(Clone)]
pub struct Context {
    pub channel: Arc<dyn Channel>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
    pub diag: Arc<Diagnostics>,
}

/// A sent segment that is not cumulatively acknowledged yet.
#[derive(Debug, Clone)]
struct Unacked {
    /// Sequence number right after this segment; acknowledged once ack >= key
    key: u32,
    seq: u32,
    flags: u8,
    payload: Vec<u8>,
}

pub struct Connection {
    serial: u64,
    id: ConnectionId,
    state: State,
    /// next sequence number we will send
    seq_no: u32,
    /// highest cumulative acknowledgment received
    send_unacked: u32,
    /// next sequence number expected from the peer
    ack_no: u32,
    // in send order, keys strictly increasing
    unacked: VecDeque<Unacked>,
    pending: VecDeque<Vec<u8>>,
    cwnd: usize,
    timer: RetransmitTimer,
    rtt: RttEstimator,
    rto: Duration,
    last_send_time: Option<Instant>,
    retransmissions: u64,
    /// the SYN+ACK timer fired at least once
    handshake_timed_out: bool,
    callback: Option<ReceiveCallback>,
    ctx: Context,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("serial", &self.serial)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("seq_no", &self.seq_no)
            .field("ack_no", &self.ack_no)
            .field("unacked.len()", &self.unacked.len())
            .field("pending.len()", &self.pending.len())
            .field("cwnd", &self.cwnd)
            .field("rto", &self.rto)
            .field("rtt", &self.rtt)
            .finish()
    }
}

impl Connection {
    /// Answer a SYN carrying `peer_isn`: pick our own initial sequence number
    /// and send SYN+ACK, tracked for retransmission like data.
    pub fn accept(serial: u64, id: ConnectionId, peer_isn: u32, ctx: Context) -> Self {
        let isn: u32 = rand::random();
        let rto = ctx.config.initial_rto;
        let mut conn = Connection {
            serial,
            id,
            state: State::HandshakeSent,
            seq_no: isn,
            send_unacked: isn,
            ack_no: peer_isn.wrapping_add(1),
            unacked: VecDeque::new(),
            pending: VecDeque::new(),
            cwnd: 1,
            timer: RetransmitTimer::default(),
            rtt: RttEstimator::new(),
            rto,
            last_send_time: None,
            retransmissions: 0,
            handshake_timed_out: false,
            callback: None,
            ctx,
        };
        debug!(
            "[#{}] {} peer ISN={}, local ISN={}",
            serial, id, peer_isn, isn
        );
        conn.transmit(SYN | ACK, Vec::new());
        conn
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Register the handler for arriving data.
    pub fn on_receive<F>(&mut self, callback: F)
    where
        F: FnMut(&mut Connection, &[u8]) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
    }

    /// Queue `data` for delivery. Chunks beyond the congestion window wait in
    /// the pending queue. A no-op once the connection is closing.
    pub fn send(&mut self, data: &[u8]) {
        if !self.is_open() {
            debug!("[#{}] send on {} connection ignored", self.serial, self.state);
            return;
        }
        self.transition(Event::Send);
        self.handshake_timed_out = false;
        self.last_send_time = Some(self.ctx.clock.now());

        for chunk in data.chunks(self.ctx.config.mss.max(1)) {
            if self.pending.is_empty() && self.in_flight() < self.cwnd {
                self.transmit(ACK, chunk.to_vec());
            } else {
                self.pending.push_back(chunk.to_vec());
            }
        }
    }

    /// Signal end of stream and send FIN. Subsequent calls do nothing.
    pub fn close(&mut self) {
        if self.is_open() {
            self.teardown();
        }
    }

    /// Process one inbound non-SYN segment.
    pub fn on_segment(&mut self, seq: u32, ack: u32, fgs: u8, payload: &[u8]) {
        trace!(
            "[#{}] {} RX: flags={} seq={} ack={} len={}",
            self.serial,
            self.id,
            flags::flags_to_string(fgs),
            seq,
            ack,
            payload.len()
        );

        match self.state {
            State::Closed => {
                self.ctx.diag.report(DropReason::Closed, Some(&self.id));
                return;
            }
            State::Closing => {
                self.on_segment_closing(ack, fgs);
                return;
            }
            _ => {}
        }

        if seq != self.ack_no {
            self.ctx.diag.report(DropReason::OutOfOrder, Some(&self.id));
            return;
        }
        self.ack_no = self.ack_no.wrapping_add(payload.len() as u32);

        if fgs & ACK != 0 {
            self.on_ack(ack);
        }

        if !payload.is_empty() {
            self.notify(payload);
            self.emit(self.seq_no, ACK, &[]);
        }

        if fgs & FIN != 0 && self.is_open() {
            debug!("[#{}] {} FIN received, peer closing", self.serial, self.id);
            self.ack_no = self.ack_no.wrapping_add(1);
            self.teardown();
        }
    }

    /// Earliest instant the retransmission timer wants attention.
    pub fn deadline(&self) -> Option<Instant> {
        self.timer.deadline().map(|d| d.at)
    }

    /// Retransmit the oldest unacknowledged segment if its timer expired.
    pub fn on_timer(&mut self, now: Instant) {
        let Some(deadline) = self.timer.expired(now) else {
            return;
        };
        let Some(oldest) = self.unacked.front().cloned() else {
            return;
        };
        if oldest.key != deadline.key {
            // superseded by an ack that raced the expiry
            self.arm_timer();
            return;
        }

        if self.state == State::HandshakeSent {
            self.handshake_timed_out = true;
        }
        self.transition(Event::Timeout);
        self.cwnd = (self.cwnd / 2).max(1);
        self.retransmissions += 1;
        debug!(
            "[#{}] {} RTO expired: retransmitting seq={} len={}, cwnd={}",
            self.serial,
            self.id,
            oldest.seq,
            oldest.payload.len(),
            self.cwnd
        );
        self.emit(oldest.seq, oldest.flags, &oldest.payload);
        self.timer.schedule(now, self.rto, oldest.key);
    }

    fn on_segment_closing(&mut self, ack: u32, fgs: u8) {
        // only acknowledgments of what we still have outstanding are of interest
        let advances = fgs & ACK != 0
            && is_seq_lt(self.send_unacked, ack)
            && is_seq_lte(ack, self.seq_no);
        if !advances {
            self.ctx.diag.report(DropReason::Closed, Some(&self.id));
            return;
        }
        self.send_unacked = ack;
        while self.unacked.front().is_some_and(|u| is_seq_lte(u.key, ack)) {
            self.unacked.pop_front();
        }
        self.arm_timer();
        if self.unacked.is_empty() {
            self.transition(Event::FinAcked);
        }
    }

    fn on_ack(&mut self, ack: u32) {
        if is_seq_lt(self.seq_no, ack) {
            self.ctx.diag.report(DropReason::InvalidAck, Some(&self.id));
            return;
        }
        if is_seq_lt(self.send_unacked, ack) {
            self.send_unacked = ack;
        }

        let mut syn_acked = false;
        let mut data_acked = 0;
        while let Some(front) = self.unacked.front() {
            if !is_seq_lte(front.key, ack) {
                break;
            }
            if front.flags & SYN != 0 {
                syn_acked = true;
            } else if !front.payload.is_empty() {
                data_acked += 1;
            }
            self.unacked.pop_front();
        }
        if !syn_acked && data_acked == 0 {
            return;
        }

        if syn_acked {
            self.transition(Event::SynAcked);
            if self.handshake_timed_out {
                // the recovery cycle started during the handshake carries over
                self.transition(Event::Timeout);
            }
        }
        if data_acked > 0 && self.state != State::Retransmitting {
            if let Some(sent_at) = self.last_send_time.take() {
                let timeout = self.rtt.sample(self.ctx.clock.since(sent_at));
                self.rto = self.ctx.config.clamp_rto(timeout);
            }
            self.cwnd += 1;
        }
        trace!(
            "[#{}] ack={} purged {} data segment(s), cwnd={}, rto={:?}",
            self.serial,
            ack,
            data_acked,
            self.cwnd,
            self.rto
        );

        self.arm_timer();
        self.drain_pending();
    }

    fn drain_pending(&mut self) {
        while self.is_open() && self.in_flight() < self.cwnd {
            let Some(chunk) = self.pending.pop_front() else {
                break;
            };
            self.transmit(ACK, chunk);
        }
    }

    fn teardown(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                "[#{}] {} closing with {} unsent segment(s), discarding",
                self.serial,
                self.id,
                self.pending.len()
            );
            self.pending.clear();
        }
        self.transition(Event::Close);
        self.notify(&[]);
        self.transmit(FIN | ACK, Vec::new());
    }

    /// Payload-carrying segments currently occupying the window.
    fn in_flight(&self) -> usize {
        self.unacked.iter().filter(|u| !u.payload.is_empty()).count()
    }

    /// Send a new segment and keep it until it is acknowledged.
    fn transmit(&mut self, fgs: u8, payload: Vec<u8>) {
        let seq = self.seq_no;
        // SYN and FIN each occupy one sequence number
        let consumed = payload.len() as u32 + u32::from(fgs & (SYN | FIN) != 0);
        self.seq_no = seq.wrapping_add(consumed);

        self.emit(seq, fgs, &payload);
        self.unacked.push_back(Unacked {
            key: self.seq_no,
            seq,
            flags: fgs,
            payload,
        });
        self.arm_timer();
    }

    fn emit(&self, seq: u32, fgs: u8, payload: &[u8]) {
        trace!(
            "[#{}] {} TX: flags={} seq={} ack={} len={}",
            self.serial,
            self.id,
            flags::flags_to_string(fgs),
            seq,
            self.ack_no,
            payload.len()
        );
        let segment = match segment::build(&self.id, seq, self.ack_no, fgs, self.ctx.config.window, payload) {
            Ok(segment) => segment,
            Err(e) => {
                warn!("[#{}] cannot build segment: {}", self.serial, e);
                return;
            }
        };
        // a lost send is covered by the retransmission timer
        if let Err(e) = self.ctx.channel.send(&segment, self.id.remote_addr) {
            warn!("[#{}] {} send failed: {}", self.serial, self.id, e);
        }
    }

    /// Point the timer at the oldest unacknowledged segment, or cancel it.
    fn arm_timer(&mut self) {
        match self.unacked.front() {
            Some(oldest) => self.timer.schedule(self.ctx.clock.now(), self.rto, oldest.key),
            None => self.timer.cancel(),
        }
    }

    fn notify(&mut self, payload: &[u8]) {
        // absent while the callback itself is running
        let Some(mut callback) = self.callback.take() else {
            return;
        };
        callback(self, payload);
        if self.callback.is_none() {
            self.callback = Some(callback);
        }
    }

    fn transition(&mut self, ev: Event) {
        if let Some(next) = self.state.on_event(ev) {
            debug!(
                "[#{}] {} STATE: {} --[{}]--> {}",
                self.serial, self.id, self.state, ev, next
            );
            self.state = next;
        }
    }
}

/// Connection snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub serial: u64,
    pub state: State,
    pub seq_no: u32,
    pub send_unacked: u32,
    pub ack_no: u32,
    pub cwnd: usize,
    pub unacked: usize,
    pub pending: usize,
    pub rto: Duration,
    pub retransmissions: u64,
    pub deadline: Option<Instant>,
}

impl Connection {
    pub fn peek(&self) -> Snapshot {
        Snapshot {
            serial: self.serial,
            state: self.state,
            seq_no: self.seq_no,
            send_unacked: self.send_unacked,
            ack_no: self.ack_no,
            cwnd: self.cwnd,
            unacked: self.unacked.len(),
            pending: self.pending.len(),
            rto: self.rto,
            retransmissions: self.retransmissions,
            deadline: self.deadline(),
        }
    }
}

#[cfg(test)]
impl Connection {
    pub fn set_cwnd(&mut self, cwnd: usize) {
        self.cwnd = cwnd;
    }

    /// Keys of the unacknowledged entries, oldest first.
    pub fn unacked_keys(&self) -> Vec<u32> {
        self.unacked.iter().map(|u| u.key).collect()
    }
}
