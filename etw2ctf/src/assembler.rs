//! The packet assembler (spec §4.6): batches per-event buffers into
//! fixed-size CTF packets.

use crate::guid::RESERVED_TRACE_UUID;
use crate::packet::PacketBuffer;
use std::collections::VecDeque;

const PACKET_MAGIC: u32 = 0xC1FC1FC1;

/// FIFO of per-event packet buffers awaiting assembly into CTF packets.
pub struct PacketAssembler {
    queue: VecDeque<PacketBuffer>,
    queued_bytes: usize,
    max_packet_bytes: usize,
}

impl PacketAssembler {
    /// `max_packet_bytes == 0` disables batching: every `push` is
    /// immediately `is_full_ready`, yielding one packet per event.
    pub fn new(max_packet_bytes: usize) -> Self {
        return Self {
            queue: VecDeque::new(),
            queued_bytes: 0,
            max_packet_bytes,
        };
    }

    pub fn push(&mut self, buffer: PacketBuffer) {
        self.queued_bytes += buffer.size();
        self.queue.push_back(buffer);
    }

    pub fn is_full_ready(&self) -> bool {
        return !self.queue.is_empty() && self.queued_bytes >= self.max_packet_bytes;
    }

    pub fn is_empty(&self) -> bool {
        return self.queued_bytes == 0;
    }

    /// Drains as many whole queued events as fit into one CTF packet
    /// (always at least one, even if it alone exceeds `max_packet_bytes`)
    /// and returns the assembled packet, header and padding included.
    ///
    /// # Panics
    ///
    /// Panics if the queue is empty -- callers must check `is_empty()`
    /// first.
    pub fn build_packet(&mut self) -> PacketBuffer {
        assert!(!self.queue.is_empty(), "build_packet called on an empty queue");

        let mut out = PacketBuffer::new();
        out.encode_u32(PACKET_MAGIC);
        out.encode_guid(&RESERVED_TRACE_UUID);

        let ctx_off = out.size();
        let content_size_off = out.reserve_u32();
        let packet_size_off = out.reserve_u32();
        let start_ts_off = out.reserve_u64();
        let stop_ts_off = out.reserve_u64();
        let _ = ctx_off;

        let mut start_ts = u64::MAX;
        let mut stop_ts = 0u64;
        let mut first = true;

        loop {
            let next = match self.queue.front() {
                Some(event) => event,
                None => break,
            };

            if !first && self.max_packet_bytes > 0 && out.size() + next.size() > self.max_packet_bytes {
                break;
            }

            let event = self.queue.pop_front().unwrap();
            self.queued_bytes -= event.size();

            start_ts = start_ts.min(event.timestamp());
            stop_ts = stop_ts.max(event.timestamp());
            out.encode_bytes(event.raw());

            first = false;
        }

        let content_size = out.size();

        if self.max_packet_bytes > 0 {
            let remainder = out.size() % self.max_packet_bytes;
            if remainder != 0 {
                let pad = self.max_packet_bytes - remainder;
                out.encode_bytes(&vec![0u8; pad]);
            }
        }

        let packet_size = out.size();

        out.update_u32(content_size_off, (content_size as u64 * 8) as u32);
        out.update_u32(packet_size_off, (packet_size as u64 * 8) as u32);
        out.update_u64(start_ts_off, start_ts);
        out.update_u64(stop_ts_off, stop_ts);

        return out;
    }
}
