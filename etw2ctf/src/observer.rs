//! The observer registry: pluggable lifecycle hooks invoked around each
//! event-encode call (spec §4.8).

use crate::layout::EventLayout;
use crate::packet::PacketBuffer;
use crate::provider::{EventInfo, EventRecord, InType, OutType};

pub mod symbols;

/// Everything an observer is allowed to call back into the driver for:
/// assigning a dictionary id to a synthesized layout and pushing the
/// resulting packet onto the sending queue. Implemented by the pipeline
/// driver, which alone owns both the dictionary and the queue (spec §5:
/// "observers ... must not call back into the driver except via the
/// documented `AddPacketToSendingQueue` entry point").
pub trait PacketSink {
    fn get_id_for_layout(&mut self, layout: EventLayout) -> u64;
    fn add_packet_to_sending_queue(&mut self, packet: PacketBuffer);
}

/// A pluggable lifecycle hook. Every method has a no-op default; an
/// observer implements only the hooks it cares about.
pub trait Observer {
    fn on_begin_process_event(&mut self, _record: &EventRecord) {}

    fn on_extract_event_info(&mut self, _record: &EventRecord, _info: &EventInfo) {}

    #[allow(clippy::too_many_arguments)]
    fn on_decode_payload_field(
        &mut self,
        _parent: u64,
        _index: u32,
        _name: &str,
        _in_type: InType,
        _out_type: OutType,
        _size: usize,
        _bytes: &[u8],
    ) {
    }

    fn on_end_process_event(&mut self, _record: &EventRecord, _sink: &mut dyn PacketSink) {}
}

/// Observers dispatched in registration order around each event-encode
/// call.
#[derive(Default)]
pub struct ObserverRegistry {
    observers: Vec<Box<dyn Observer>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        return Self {
            observers: Vec::new(),
        };
    }

    /// Registry pre-loaded with the bundled observers (currently: the
    /// symbol-enrichment observer, with a no-op resolver).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(symbols::SymbolsObserver::default()));
        return registry;
    }

    pub fn register(&mut self, observer: Box<dyn Observer>) {
        self.observers.push(observer);
    }

    pub fn on_begin_process_event(&mut self, record: &EventRecord) {
        for o in &mut self.observers {
            o.on_begin_process_event(record);
        }
    }

    pub fn on_extract_event_info(&mut self, record: &EventRecord, info: &EventInfo) {
        for o in &mut self.observers {
            o.on_extract_event_info(record, info);
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn on_decode_payload_field(
        &mut self,
        parent: u64,
        index: u32,
        name: &str,
        in_type: InType,
        out_type: OutType,
        size: usize,
        bytes: &[u8],
    ) {
        for o in &mut self.observers {
            o.on_decode_payload_field(parent, index, name, in_type, out_type, size, bytes);
        }
    }

    pub fn on_end_process_event(&mut self, record: &EventRecord, sink: &mut dyn PacketSink) {
        for o in &mut self.observers {
            o.on_end_process_event(record, sink);
        }
    }
}
