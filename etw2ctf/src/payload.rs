//! The payload decoder (spec §4.5): walks the property-info array returned
//! by the provider helper, decoding each top-level property via the scalar
//! decoder and falling back to a raw `{u16 size; bytes}` encoding per
//! property that cannot be decoded.

use crate::error::DecodeError;
use crate::layout::{EventLayout, Field, FieldType, ROOT_PARENT};
use crate::observer::ObserverRegistry;
use crate::packet::PacketBuffer;
use crate::provider::{
    DecodingSource, EventProviderApi, EventRecord, GetEventInfoResult, PropertyInfo, PropertyPath,
};
use crate::scalar::decode_scalar;

/// Decodes `record`'s payload into `buf`/`layout`.
///
/// Returns the schema's opcode name on success (empty if the schema did not
/// supply one -- the caller falls back to a generated name). On failure,
/// `buf` and `layout` are left exactly as they were on entry; the caller is
/// responsible for trying dissectors and the whole-payload raw fallback.
pub fn decode_payload(
    record: &EventRecord,
    provider: &dyn EventProviderApi,
    event_info_scratch: &mut Vec<u8>,
    property_scratch: &mut Vec<u8>,
    buf: &mut PacketBuffer,
    layout: &mut EventLayout,
    observers: &mut ObserverRegistry,
) -> Result<String, DecodeError> {
    if record.is_string_only {
        let field = decode_scalar(
            ROOT_PARENT,
            "data",
            crate::provider::InType::UnicodeString,
            crate::provider::OutType::Default,
            record.payload.len(),
            &record.payload,
            buf,
        )?;
        layout.add_field(field);
        return Ok(String::new());
    }

    let info = match provider.get_event_info(record, event_info_scratch) {
        GetEventInfoResult::Success(info) => info,
        GetEventInfoResult::InsufficientBuffer { required_size } => {
            event_info_scratch.resize(required_size, 0);
            match provider.get_event_info(record, event_info_scratch) {
                GetEventInfoResult::Success(info) => info,
                _ => return Err(DecodeError::EventInfoUnavailable),
            }
        }
        GetEventInfoResult::Error => return Err(DecodeError::EventInfoUnavailable),
    };

    if info.decoding_source != DecodingSource::Wbem && info.decoding_source != DecodingSource::XmlFile
    {
        return Err(DecodeError::UnsupportedDecodingSource);
    }

    observers.on_extract_event_info(record, &info);

    let mut payload_cursor: usize = 0;
    for (i, property) in info.properties.iter().enumerate() {
        let packet_offset = buf.size();
        let descr_offset = layout.fields.len();

        match decode_property(
            ROOT_PARENT,
            property,
            i as u32,
            record,
            provider,
            property_scratch,
            buf,
            layout,
            observers,
        ) {
            Ok(consumed) => {
                payload_cursor += consumed;
            }
            Err(reason) => {
                log::debug!(
                    "property \"{}\" (index {}): decode failed ({}), falling back to raw bytes",
                    property.name,
                    i,
                    reason,
                );
                buf.reset(packet_offset);
                layout.fields.truncate(descr_offset);
                match send_raw_field(
                    &property.name,
                    payload_cursor,
                    record,
                    provider,
                    buf,
                    layout,
                ) {
                    Ok(consumed) => payload_cursor += consumed,
                    Err(e) => {
                        buf.reset(packet_offset);
                        layout.fields.truncate(descr_offset);
                        return Err(e);
                    }
                }
            }
        }
    }

    return Ok(info.opcode_name);
}

#[allow(clippy::too_many_arguments)]
fn decode_property(
    parent: u64,
    property: &PropertyInfo,
    index: u32,
    record: &EventRecord,
    provider: &dyn EventProviderApi,
    property_scratch: &mut Vec<u8>,
    buf: &mut PacketBuffer,
    layout: &mut EventLayout,
    observers: &mut ObserverRegistry,
) -> Result<usize, DecodeError> {
    if property.flags != 0 {
        return Err(DecodeError::UnsupportedPropertyFlags);
    }

    let count = property.count.max(1);
    let new_parent = if count > 1 {
        let array_index = layout.next_field_index();
        layout.add_field(
            Field::new(FieldType::ArrayFixed, &property.name, parent).with_size(count as u64),
        );
        array_index
    } else {
        parent
    };

    let mut total_consumed = 0usize;
    let mut canonical: Option<Field> = None;

    for element in 0..count {
        let path = PropertyPath {
            name: &property.name,
            index: element as u32,
        };
        let size = provider
            .get_property_size(record, &path)
            .ok_or(DecodeError::EventInfoUnavailable)? as usize;

        if property_scratch.len() < size {
            property_scratch.resize(size, 0);
        }
        if !provider.get_property(record, &path, &mut property_scratch[..size]) {
            return Err(DecodeError::EventInfoUnavailable);
        }

        observers.on_decode_payload_field(
            new_parent,
            index,
            &property.name,
            property.in_type,
            property.out_type,
            size,
            &property_scratch[..size],
        );

        let field = decode_scalar(
            new_parent,
            &property.name,
            property.in_type,
            property.out_type,
            size,
            &property_scratch[..size],
            buf,
        )?;

        if element == 0 {
            canonical = Some(field.clone());
            layout.add_field(field);
        } else if canonical.as_ref() != Some(&field) {
            return Err(DecodeError::MismatchedArrayElement);
        }

        total_consumed += size;
    }

    return Ok(total_consumed);
}

/// Raw fallback for one property that failed to decode: a nested
/// `{ u16 size; u8 data[size]; }` struct, with bytes drawn verbatim from the
/// record's payload starting at `payload_cursor`.
fn send_raw_field(
    name: &str,
    payload_cursor: usize,
    record: &EventRecord,
    provider: &dyn EventProviderApi,
    buf: &mut PacketBuffer,
    layout: &mut EventLayout,
) -> Result<usize, DecodeError> {
    let path = PropertyPath { name, index: 0 };
    let size = provider
        .get_property_size(record, &path)
        .ok_or(DecodeError::EventInfoUnavailable)? as usize;

    if payload_cursor + size > record.payload.len() {
        return Err(DecodeError::EventInfoUnavailable);
    }
    let bytes = &record.payload[payload_cursor..payload_cursor + size];

    encode_raw_struct(name, bytes, ROOT_PARENT, buf, layout);
    return Ok(size);
}

/// Encodes a `{ u16 size; u8 data[size]; }` struct named `field_name` under
/// `parent`, both in the layout's field list and as wire bytes. Shared by
/// the per-property fallback above and the whole-payload fallback in
/// `encoder.rs`.
pub(crate) fn encode_raw_struct(
    field_name: &str,
    bytes: &[u8],
    parent: u64,
    buf: &mut PacketBuffer,
    layout: &mut EventLayout,
) {
    let struct_index = layout.next_field_index();
    layout.add_field(Field::new(FieldType::StructBegin, field_name, parent));
    layout.add_field(Field::new(FieldType::Uint16, "size", struct_index));
    layout.add_field(
        Field::new(FieldType::BinaryVar, "data", struct_index).with_size_ref("size"),
    );
    layout.add_field(Field::new(FieldType::StructEnd, field_name, parent));

    buf.encode_u16(bytes.len() as u16);
    buf.encode_bytes(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guid::Guid;
    use crate::provider::{EventInfo, GetEventInfoResult, InType, OutType};
    use std::cell::RefCell;

    struct StubProvider {
        info: EventInfo,
        values: Vec<Vec<u8>>,
        calls: RefCell<usize>,
    }

    impl EventProviderApi for StubProvider {
        fn open_trace(
            &mut self,
            _path: &std::path::Path,
        ) -> Result<crate::provider::TraceHandle, crate::error::PipelineError> {
            unimplemented!()
        }
        fn process_trace(
            &mut self,
            _handles: &[crate::provider::TraceHandle],
            _callbacks: &mut dyn crate::provider::EventCallbacks,
        ) -> Result<(), crate::error::PipelineError> {
            unimplemented!()
        }
        fn close_trace(&mut self, _handle: crate::provider::TraceHandle) {}

        fn get_event_info(&self, _record: &EventRecord, _out_buf: &mut Vec<u8>) -> GetEventInfoResult {
            return GetEventInfoResult::Success(self.info.clone());
        }

        fn get_property_size(&self, _record: &EventRecord, path: &PropertyPath) -> Option<u32> {
            let prop_index = self.info.properties.iter().position(|p| p.name == path.name)?;
            return Some(self.values[prop_index].len() as u32);
        }

        fn get_property(&self, _record: &EventRecord, path: &PropertyPath, out_buf: &mut [u8]) -> bool {
            *self.calls.borrow_mut() += 1;
            let prop_index = match self.info.properties.iter().position(|p| p.name == path.name) {
                Some(i) => i,
                None => return false,
            };
            let value = &self.values[prop_index];
            out_buf[..value.len()].copy_from_slice(value);
            return true;
        }
    }

    fn sample_record() -> EventRecord {
        return EventRecord {
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
            payload: 42u32.to_le_bytes().to_vec(),
        };
    }

    #[test]
    fn decodes_single_scalar_property() {
        let provider = StubProvider {
            info: EventInfo {
                event_guid: Guid::zero(),
                opcode: 0,
                version: 0,
                event_id: 1,
                opcode_name: "event1".into(),
                decoding_source: DecodingSource::Wbem,
                properties: vec![PropertyInfo {
                    name: "value".into(),
                    in_type: InType::Uint32,
                    out_type: OutType::Default,
                    count: 1,
                    flags: 0,
                }],
            },
            values: vec![42u32.to_le_bytes().to_vec()],
            calls: RefCell::new(0),
        };

        let record = sample_record();
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), Guid::zero(), 0, 0, 1);
        let mut observers = ObserverRegistry::new();
        let mut scratch1 = Vec::new();
        let mut scratch2 = Vec::new();

        let name = decode_payload(
            &record,
            &provider,
            &mut scratch1,
            &mut scratch2,
            &mut buf,
            &mut layout,
            &mut observers,
        )
        .unwrap();

        assert_eq!(name, "event1");
        assert_eq!(layout.fields.len(), 1);
        assert_eq!(layout.fields[0].field_type, FieldType::Uint32);
        assert_eq!(buf.raw(), &42u32.to_le_bytes());
    }

    #[test]
    fn non_zero_flags_falls_back_to_raw_struct() {
        let provider = StubProvider {
            info: EventInfo {
                event_guid: Guid::zero(),
                opcode: 0,
                version: 0,
                event_id: 1,
                opcode_name: "event1".into(),
                decoding_source: DecodingSource::Wbem,
                properties: vec![PropertyInfo {
                    name: "blob".into(),
                    in_type: InType::Uint32,
                    out_type: OutType::Default,
                    count: 1,
                    flags: 1,
                }],
            },
            values: vec![42u32.to_le_bytes().to_vec()],
            calls: RefCell::new(0),
        };

        let record = sample_record();
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), Guid::zero(), 0, 0, 1);
        let mut observers = ObserverRegistry::new();
        let mut scratch1 = Vec::new();
        let mut scratch2 = Vec::new();

        decode_payload(
            &record,
            &provider,
            &mut scratch1,
            &mut scratch2,
            &mut buf,
            &mut layout,
            &mut observers,
        )
        .unwrap();

        assert_eq!(layout.fields.len(), 4);
        assert_eq!(layout.fields[0].field_type, FieldType::StructBegin);
        assert_eq!(layout.fields[1].field_type, FieldType::Uint16);
        assert_eq!(layout.fields[2].field_type, FieldType::BinaryVar);
        assert_eq!(layout.fields[3].field_type, FieldType::StructEnd);
        assert_eq!(&buf.raw()[0..2], &4u16.to_le_bytes());
        assert_eq!(&buf.raw()[2..6], &42u32.to_le_bytes());
    }
}
