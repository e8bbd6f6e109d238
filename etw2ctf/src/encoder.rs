//! The event encoder (spec §4.3): turns one provider record into a
//! fully-encoded per-event [`PacketBuffer`] plus the [`EventLayout`] it was
//! encoded against.

use crate::dissector::DissectorRegistry;
use crate::layout::EventLayout;
use crate::observer::ObserverRegistry;
use crate::packet::PacketBuffer;
use crate::payload;
use crate::provider::{EventProviderApi, EventRecord, TRACE_EVENT_INFO_OPCODE, TRACE_EVENT_INFO_PROVIDER};

/// The result of encoding one record: a packet buffer with the dictionary-id
/// slot still holding a placeholder zero, the offset of that slot, and the
/// layout the buffer was encoded against (not yet assigned a dictionary id).
pub struct EncodedEvent {
    pub buffer: PacketBuffer,
    pub id_offset: usize,
    pub layout: EventLayout,
}

/// Encodes one record. Returns `None` if the record is a reserved
/// trace-events/info record, which is dropped unconditionally (spec §4.3
/// step 1).
pub fn encode_event(
    record: &EventRecord,
    provider: &dyn EventProviderApi,
    event_info_scratch: &mut Vec<u8>,
    property_scratch: &mut Vec<u8>,
    dissectors: &DissectorRegistry,
    observers: &mut ObserverRegistry,
) -> Option<EncodedEvent> {
    if record.provider_id == TRACE_EVENT_INFO_PROVIDER && record.opcode == TRACE_EVENT_INFO_OPCODE {
        return None;
    }

    let mut buf = PacketBuffer::new();
    buf.set_timestamp(record.timestamp);
    buf.encode_u64(record.timestamp);
    let id_offset = buf.reserve_u32();

    write_context_block(&mut buf, record);

    let payload_offset = buf.size();
    let mut layout = EventLayout::new(
        String::new(),
        record.provider_id,
        record.opcode,
        record.version,
        record.event_id,
    );

    match payload::decode_payload(
        record,
        provider,
        event_info_scratch,
        property_scratch,
        &mut buf,
        &mut layout,
        observers,
    ) {
        Ok(opcode_name) => {
            layout.name = resolve_name(&opcode_name, record.event_id);
        }
        Err(reason) => {
            log::debug!(
                "event {} (provider {}, opcode {}): payload decode failed ({}), falling back to dissectors",
                record.event_id,
                record.provider_id,
                record.opcode,
                reason,
            );
            buf.reset(payload_offset);
            layout.fields.clear();

            if dissectors.decode(record.provider_id, record.opcode, &record.payload, &mut buf, &mut layout) {
                if layout.name.is_empty() {
                    layout.name = resolve_name("", record.event_id);
                }
            } else {
                log::debug!(
                    "event {} (provider {}, opcode {}): no dissector matched, falling back to raw payload",
                    record.event_id,
                    record.provider_id,
                    record.opcode,
                );
                buf.reset(payload_offset);
                layout.fields.clear();
                payload::encode_raw_struct(
                    "payload",
                    &record.payload,
                    crate::layout::ROOT_PARENT,
                    &mut buf,
                    &mut layout,
                );
                layout.name = resolve_name("", record.event_id);
            }
        }
    }

    return Some(EncodedEvent {
        buffer: buf,
        id_offset,
        layout,
    });
}

fn resolve_name(opcode_name: &str, event_id: u16) -> String {
    if !opcode_name.is_empty() {
        return opcode_name.to_string();
    }
    return format!("event{}", event_id);
}

/// Writes the fixed stream context block in the exact order, width, and
/// deliberate repetition specified by spec §4.3 step 3. Also used by the
/// symbol-enrichment observer to give its synthesized events a conforming
/// context block.
pub fn write_context_block(buf: &mut PacketBuffer, record: &EventRecord) {
    buf.encode_u16(record.event_id);
    buf.encode_u8(record.version);
    buf.encode_u8(record.channel);
    buf.encode_u8(record.level);
    buf.encode_u8(record.opcode);
    buf.encode_u16(record.task);
    buf.encode_u64(record.keyword);
    buf.encode_u32(record.process_id);
    buf.encode_u32(record.thread_id);
    buf.encode_u8(record.processor_id);
    buf.encode_u16(record.logger_id);
    buf.encode_guid(&record.provider_id);
    buf.encode_guid(&record.activity_id);
    buf.encode_u16(record.header_type);
    buf.encode_u16(record.header_flags);
    buf.encode_u16(record.header_flags);
    buf.encode_u16(record.header_properties);
    buf.encode_u16(record.header_properties);
    buf.encode_u8(record.processor_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;

    #[test]
    fn context_block_has_the_fixed_width_of_spec_4_3() {
        let mut buf = PacketBuffer::new();
        let record = EventRecord {
            timestamp: 0,
            provider_id: Guid::zero(),
            activity_id: Guid::zero(),
            event_id: 1,
            version: 0,
            channel: 0,
            level: 0,
            opcode: 0,
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
        write_context_block(&mut buf, &record);
        // 11 leading scalar fields (27 bytes) + 2 uuids (32 bytes) +
        // header_type (2) + flags written twice (4) + properties written
        // twice (4) + repeated cpu_id (1) = 70 bytes.
        assert_eq!(buf.size(), 70);
    }
}
