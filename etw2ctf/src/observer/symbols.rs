//! The symbol-enrichment observer (spec §4.8; wire shapes pinned from the
//! original `etw_observer/symbols_observer.cc` and `sym_util/image.cc`).
//!
//! Watches for `Load`/`DCStart` events of the kernel Image provider, captures
//! the loaded module's identity, and -- the first time a given image is
//! seen -- emits a synthetic `ImageId` event followed by one synthetic
//! `SymbolInfo` event per symbol the [`SymbolResolver`] returns for it, all
//! correlated by a shared image id. Images are deduplicated by identity, not
//! just base address, since the same module can be mapped more than once
//! across the trace.

use crate::encoder::write_context_block;
use crate::guid::Guid;
use crate::layout::{EventLayout, Field, FieldType, ROOT_PARENT};
use crate::observer::{Observer, PacketSink};
use crate::packet::PacketBuffer;
use crate::provider::{EventRecord, InType, OutType};

/// `2cb15d1d-5fc1-11d2-abe1-00a0c911f518`, the kernel Image provider.
const IMAGE_PROVIDER_GUID: Guid = Guid::from_fields(
    0x2cb15d1d,
    0x5fc1,
    0x11d2,
    [0xab, 0xe1, 0x00, 0xa0, 0xc9, 0x11, 0xf5, 0x18],
);
const IMAGE_OPCODE_LOAD: u8 = 10;
const IMAGE_OPCODE_DCSTART: u8 = 3;

/// Synthetic provider under which `ImageId`/`SymbolInfo` events are emitted.
const SYMBOLS_PROVIDER_GUID: Guid = Guid::from_fields(
    0x186fbaef,
    0x0e6a,
    0x45a9,
    [0xa1, 0xad, 0x90, 0xa1, 0x0b, 0x69, 0x56, 0x69],
);
const IMAGE_ID_OPCODE: u8 = 0xf0;
const SYMBOL_INFO_OPCODE: u8 = 0xf1;
const SYNTHETIC_VERSION: u8 = 1;

/// A loaded module's identity. Field order matches the original's
/// `operator<` priority (base address, then size, then checksum, then
/// timestamp, then filename), so the derived `Ord` dedups the same way.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Image {
    pub base_address: u64,
    pub size: u64,
    pub checksum: u32,
    pub timestamp: u32,
    pub filename: String,
}

/// One symbol resolved for an [`Image`].
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub address: u64,
}

/// The symbol-resolution helper library (spec §1): an external collaborator
/// out of this crate's scope. Resolving symbols from a PDB or a symbol
/// server is platform- and environment-specific; this crate only defines the
/// boundary and ships a no-op default.
pub trait SymbolResolver {
    fn resolve(&mut self, image: &Image) -> Vec<Symbol>;
}

/// Resolves nothing. The default when the caller wires no real resolver.
#[derive(Debug, Default)]
pub struct NullSymbolResolver;

impl SymbolResolver for NullSymbolResolver {
    fn resolve(&mut self, _image: &Image) -> Vec<Symbol> {
        return Vec::new();
    }
}

/// Observer implementing the image-load dedup + synthetic-event emission
/// described above.
pub struct SymbolsObserver {
    resolver: Box<dyn SymbolResolver>,
    loading: bool,
    current: Image,
    seen: Vec<Image>,
}

impl SymbolsObserver {
    pub fn new(resolver: Box<dyn SymbolResolver>) -> Self {
        return Self {
            resolver,
            loading: false,
            current: Image::default(),
            seen: Vec::new(),
        };
    }
}

impl Default for SymbolsObserver {
    fn default() -> Self {
        return Self::new(Box::new(NullSymbolResolver));
    }
}

impl Observer for SymbolsObserver {
    fn on_extract_event_info(&mut self, _record: &EventRecord, info: &crate::provider::EventInfo) {
        let is_image_load = info.event_guid == IMAGE_PROVIDER_GUID
            && (info.opcode == IMAGE_OPCODE_LOAD || info.opcode == IMAGE_OPCODE_DCSTART);
        if is_image_load {
            self.loading = true;
            self.current = Image::default();
        }
    }

    fn on_decode_payload_field(
        &mut self,
        _parent: u64,
        _index: u32,
        name: &str,
        in_type: InType,
        _out_type: OutType,
        _size: usize,
        bytes: &[u8],
    ) {
        if !self.loading {
            return;
        }
        match name {
            "ImageBase" => self.current.base_address = capture_long(bytes).unwrap_or(0),
            "ImageSize" => self.current.size = capture_long(bytes).unwrap_or(0),
            "ImageChecksum" => self.current.checksum = capture_uint32(bytes).unwrap_or(0),
            "TimeDateStamp" => self.current.timestamp = capture_uint32(bytes).unwrap_or(0),
            "FileName" => self.current.filename = capture_filename(in_type, bytes),
            _ => {}
        }
    }

    fn on_end_process_event(&mut self, record: &EventRecord, sink: &mut dyn PacketSink) {
        if !self.loading {
            return;
        }
        self.loading = false;

        if self.seen.iter().any(|image| *image == self.current) {
            return;
        }

        let image_id = self.seen.len() as u64;
        emit_image_id(record.timestamp, image_id, &self.current, sink);
        for symbol in self.resolver.resolve(&self.current) {
            emit_symbol_info(record.timestamp, image_id, &symbol, sink);
        }
        self.seen.push(self.current.clone());
    }
}

fn capture_long(bytes: &[u8]) -> Option<u64> {
    return match bytes.len() {
        4 => Some(u32::from_le_bytes(bytes[0..4].try_into().ok()?) as u64),
        8 => Some(u64::from_le_bytes(bytes[0..8].try_into().ok()?)),
        _ => None,
    };
}

fn capture_uint32(bytes: &[u8]) -> Option<u32> {
    if bytes.len() != 4 {
        return None;
    }
    return Some(u32::from_le_bytes(bytes[0..4].try_into().ok()?));
}

fn capture_filename(in_type: InType, bytes: &[u8]) -> String {
    return match in_type {
        InType::UnicodeString => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
    };
}

/// Builds a synthesized record sharing `timestamp` and `record` enough of a
/// context block to be packaged like any other event, then starts a fresh
/// per-event packet buffer for it.
fn begin_synthetic_packet(timestamp: u64, opcode: u8, name: &str) -> (PacketBuffer, usize, EventLayout) {
    let record = EventRecord {
        timestamp,
        provider_id: SYMBOLS_PROVIDER_GUID,
        activity_id: Guid::zero(),
        event_id: 0,
        version: SYNTHETIC_VERSION,
        channel: 0,
        level: 0,
        opcode,
        task: 0,
        keyword: 0,
        process_id: 0,
        thread_id: 0,
        processor_id: 0,
        logger_id: 0,
        header_type: 0,
        header_flags: 0,
        header_properties: 0,
        is_string_only: false,
        payload: Vec::new(),
    };

    let mut buf = PacketBuffer::new();
    buf.set_timestamp(timestamp);
    buf.encode_u64(timestamp);
    let id_offset = buf.reserve_u32();
    write_context_block(&mut buf, &record);

    let layout = EventLayout::new(
        name,
        SYMBOLS_PROVIDER_GUID,
        opcode,
        SYNTHETIC_VERSION,
        record.event_id,
    );
    return (buf, id_offset, layout);
}

fn emit_image_id(timestamp: u64, image_id: u64, image: &Image, sink: &mut dyn PacketSink) {
    let (mut buf, id_offset, mut layout) = begin_synthetic_packet(timestamp, IMAGE_ID_OPCODE, "ImageId");

    layout.add_field(Field::new(FieldType::Xint64, "ImageBase", ROOT_PARENT));
    buf.encode_u64(image.base_address);

    layout.add_field(Field::new(FieldType::Uint64, "ImageSize", ROOT_PARENT));
    buf.encode_u64(image.size);

    layout.add_field(Field::new(FieldType::Uint32, "ImageChecksum", ROOT_PARENT));
    buf.encode_u32(image.checksum);

    layout.add_field(Field::new(FieldType::Uint32, "TimeDateStamp", ROOT_PARENT));
    buf.encode_u32(image.timestamp);

    layout.add_field(Field::new(FieldType::String, "FileName", ROOT_PARENT));
    buf.encode_string(&image.filename);

    layout.add_field(Field::new(FieldType::Xint64, "ImageIdentifier", ROOT_PARENT));
    buf.encode_u64(image_id);

    let id = sink.get_id_for_layout(layout);
    buf.update_u32(id_offset, id as u32);
    sink.add_packet_to_sending_queue(buf);
}

fn emit_symbol_info(timestamp: u64, image_id: u64, symbol: &Symbol, sink: &mut dyn PacketSink) {
    let (mut buf, id_offset, mut layout) =
        begin_synthetic_packet(timestamp, SYMBOL_INFO_OPCODE, "SymbolInfo");

    layout.add_field(Field::new(FieldType::Xint64, "ImageIdentifier", ROOT_PARENT));
    buf.encode_u64(image_id);

    layout.add_field(Field::new(FieldType::String, "SymbolName", ROOT_PARENT));
    buf.encode_string(&symbol.name);

    layout.add_field(Field::new(FieldType::Xint64, "SymbolAddress", ROOT_PARENT));
    buf.encode_u64(symbol.address);

    let id = sink.get_id_for_layout(layout);
    buf.update_u32(id_offset, id as u32);
    sink.add_packet_to_sending_queue(buf);
}
