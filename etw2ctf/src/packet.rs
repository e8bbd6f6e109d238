//! Append-only byte buffer used both as the per-event scratch buffer and as
//! the assembled per-packet buffer (spec §4.1).

use crate::guid::Guid;

/// An append-only little-endian byte buffer with in-place patching of
/// previously reserved u32/u64 slots.
///
/// Encoders never fail -- the buffer grows as needed. `update_*` requires the
/// target offset and width to already be within `size()`; violating that is
/// a contract violation (spec §7), not a runtime error, so it is an
/// `assert!` rather than a `Result`.
#[derive(Debug, Default, Clone)]
pub struct PacketBuffer {
    bytes: Vec<u8>,
    timestamp: u64,
}

impl PacketBuffer {
    pub fn new() -> Self {
        return Self {
            bytes: Vec::new(),
            timestamp: 0,
        };
    }

    pub fn encode_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn encode_u16(&mut self, v: u16) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn encode_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn encode_u64(&mut self, v: u64) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    /// Encodes a GUID using the wire byte order of spec §3 (big-endian
    /// `Data1`/`Data2`/`Data3`, `Data4` verbatim) -- the only big-endian
    /// section inside an otherwise little-endian stream.
    pub fn encode_guid(&mut self, guid: &Guid) {
        self.bytes.extend_from_slice(&guid.to_bytes_be());
    }

    pub fn encode_bytes(&mut self, src: &[u8]) {
        self.bytes.extend_from_slice(src);
    }

    /// Appends `s`'s bytes followed by a terminating `0x00`.
    pub fn encode_string(&mut self, s: &str) {
        self.bytes.extend_from_slice(s.as_bytes());
        self.bytes.push(0);
    }

    /// Reserves `width` zero bytes and returns the offset they start at, for
    /// later patching with `update_u32`/`update_u64`.
    pub fn reserve_u32(&mut self) -> usize {
        let offset = self.bytes.len();
        self.encode_u32(0);
        return offset;
    }

    pub fn reserve_u64(&mut self) -> usize {
        let offset = self.bytes.len();
        self.encode_u64(0);
        return offset;
    }

    /// Truncates the buffer to `offset`, discarding everything appended
    /// since. Used to roll back a half-decoded field or payload.
    pub fn reset(&mut self, offset: usize) {
        assert!(offset <= self.bytes.len(), "reset offset past buffer end");
        self.bytes.truncate(offset);
    }

    /// Overwrites 4 bytes at `offset` with `v` in little-endian order.
    ///
    /// # Panics
    ///
    /// Panics (contract violation) if `offset + 4 > size()`.
    pub fn update_u32(&mut self, offset: usize, v: u32) {
        assert!(offset + 4 <= self.bytes.len(), "update_u32 out of bounds");
        self.bytes[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Overwrites 8 bytes at `offset` with `v` in little-endian order.
    ///
    /// # Panics
    ///
    /// Panics (contract violation) if `offset + 8 > size()`.
    pub fn update_u64(&mut self, offset: usize, v: u64) {
        assert!(offset + 8 <= self.bytes.len(), "update_u64 out of bounds");
        self.bytes[offset..offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn size(&self) -> usize {
        return self.bytes.len();
    }

    pub fn raw(&self) -> &[u8] {
        return &self.bytes;
    }

    pub fn timestamp(&self) -> u64 {
        return self.timestamp;
    }

    pub fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_u32_round_trips_through_update_u32() {
        let mut buf = PacketBuffer::new();
        let offset = buf.reserve_u32();
        buf.update_u32(offset, 0xdeadbeef);
        assert_eq!(&buf.raw()[offset..offset + 4], &0xdeadbeefu32.to_le_bytes());
    }

    #[test]
    fn encode_string_appends_nul_terminator() {
        let mut buf = PacketBuffer::new();
        buf.encode_string("hi");
        assert_eq!(buf.raw(), b"hi\0");
    }

    #[test]
    fn reset_truncates() {
        let mut buf = PacketBuffer::new();
        buf.encode_u32(1);
        let marker = buf.size();
        buf.encode_u64(2);
        buf.reset(marker);
        assert_eq!(buf.size(), marker);
    }

    #[test]
    fn guid_wire_encoding_matches_spec_example() {
        let guid = Guid::from_fields(
            0x29CB3580,
            0x13C6,
            0x4C85,
            [0xA4, 0xCB, 0xA2, 0xC0, 0xFF, 0xA6, 0x88, 0x90],
        );
        let mut buf = PacketBuffer::new();
        buf.encode_guid(&guid);
        assert_eq!(
            buf.raw(),
            &[
                0x29, 0xCB, 0x35, 0x80, 0x13, 0xC6, 0x4C, 0x85, 0xA4, 0xCB, 0xA2, 0xC0, 0xFF,
                0xA6, 0x88, 0x90,
            ]
        );
    }

    #[test]
    #[should_panic]
    fn update_past_end_panics() {
        let mut buf = PacketBuffer::new();
        buf.encode_u8(1);
        buf.update_u32(0, 5);
    }
}
