use super::{Channel, Inbound};
use crate::tcp::{flags_to_string, SegmentHeader};
use std::collections::VecDeque;
use std::io;
use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A segment the code under test handed to the channel.
#[derive(Debug, Clone)]
pub struct Sent {
    pub desc: String,
    pub dst: Ipv4Addr,
    pub bytes: Vec<u8>,
}

impl Sent {
    pub fn header(&self) -> SegmentHeader {
        SegmentHeader::parse(&self.bytes).unwrap()
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[self.header().payload_offset()..]
    }
}

#[derive(Clone)]
pub struct MockChannel {
    rx_queue: Arc<Mutex<VecDeque<(Ipv4Addr, Ipv4Addr, Vec<u8>)>>>,
    tx_log: Arc<Mutex<Vec<Sent>>>,
    drop_probability: Arc<Mutex<f32>>,
    enforce_checksum: Arc<Mutex<bool>>,
}

impl MockChannel {
    pub fn new() -> Self {
        Self {
            rx_queue: Arc::new(Mutex::new(VecDeque::new())),
            tx_log: Arc::new(Mutex::new(Vec::new())),
            drop_probability: Arc::new(Mutex::new(0.0)), // No segment loss by default
            enforce_checksum: Arc::new(Mutex::new(true)),
        }
    }

    pub fn inject(&self, src: &str, dst: &str, segment: Vec<u8>) {
        self.rx_queue.lock().unwrap().push_back((
            src.parse().unwrap(),
            dst.parse().unwrap(),
            segment,
        ));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.tx_log.lock().unwrap().clone()
    }

    pub fn clear_sent(&self) {
        self.tx_log.lock().unwrap().clear();
    }

    pub fn last_sent(&self) -> Option<Sent> {
        self.tx_log.lock().unwrap().last().cloned()
    }

    /// Set segment loss probability (0.0 = no loss, 1.0 = drop all)
    pub fn set_drop_probability(&self, probability: f32) {
        *self.drop_probability.lock().unwrap() = probability.clamp(0.0, 1.0);
    }

    pub fn set_enforce_checksum(&self, enforce: bool) {
        *self.enforce_checksum.lock().unwrap() = enforce;
    }
}

impl Channel for MockChannel {
    fn recv(&self, buf: &mut [u8], _timeout: Option<Duration>) -> io::Result<Option<Inbound>> {
        let mut queue = self.rx_queue.lock().unwrap();
        match queue.pop_front() {
            Some((src, dst, segment)) => {
                let len = segment.len().min(buf.len());
                buf[..len].copy_from_slice(&segment[..len]);
                Ok(Some(Inbound { src, dst, len }))
            }
            None => Ok(None),
        }
    }

    fn send(&self, segment: &[u8], dst: Ipv4Addr) -> io::Result<()> {
        let drop_probability = *self.drop_probability.lock().unwrap();
        if drop_probability > 0.0 && rand::random::<f32>() < drop_probability {
            // pretend it went out
            return Ok(());
        }

        let desc = match SegmentHeader::parse(segment) {
            Ok(h) => format!(
                "{} → {}:{} [{}] seq={} ack={} len={}",
                h.src_port,
                dst,
                h.dst_port,
                flags_to_string(h.flags),
                h.seq,
                h.ack,
                segment.len() - h.payload_offset()
            ),
            Err(_) => "Unknown".to_string(),
        };
        self.tx_log.lock().unwrap().push(Sent {
            desc,
            dst,
            bytes: segment.to_vec(),
        });
        Ok(())
    }

    fn enforce_checksum(&self) -> bool {
        *self.enforce_checksum.lock().unwrap()
    }
}
