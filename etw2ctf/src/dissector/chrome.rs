//! The bundled Chrome dissector (spec §4.7; wire format pinned from the
//! original `dissector/chrome_dissector.cc`).
//!
//! Matches a specific provider UUID and decodes a self-delimited record: a
//! variable-length name string, a u64 id, a categories string, up to 7
//! argument pairs gated by the low 3 bits of `opcode`, and -- if bit 3 of
//! `opcode` is set -- a stack trace. If any unconsumed bytes remain once
//! decoding is done, the whole call fails and the caller falls through to
//! the raw-payload fallback.

use crate::dissector::Dissector;
use crate::guid::Guid;
use crate::layout::{EventLayout, Field, FieldType, ROOT_PARENT};
use crate::packet::PacketBuffer;

/// `d2d578d9-2936-45b6-a09f-30e32715f41d`
pub const CHROME_PROVIDER_GUID: Guid = Guid::from_fields(
    0xd2d578d9,
    0x2936,
    0x45b6,
    [0xa0, 0x9f, 0x30, 0xe3, 0x27, 0x15, 0xf4, 0x1d],
);

/// Indexed by `opcode >> 4`. Entry 0 is unused and always fails the match.
const CHROME_INTERNAL_EVENT_TYPE_NAME: [&str; 16] = [
    "",
    "ChromeBegin",
    "ChromeInstant",
    "ChromeEnd",
    "ChromeFlowBegin",
    "ChromeFlowStep",
    "ChromeFlowEnd",
    "ChromeAsyncBegin",
    "ChromeAsyncStep",
    "ChromeAsyncEnd",
    "ChromeCreateObject",
    "ChromeSnapshotObject",
    "ChromeDeleteObject",
    "ChromeMetadata",
    "ChromeCounter",
    "ChromeSample",
];

pub struct ChromeDissector;

impl Dissector for ChromeDissector {
    fn name(&self) -> &str {
        return "chrome";
    }

    fn decode(
        &self,
        guid: Guid,
        opcode: u8,
        payload: &[u8],
        buf: &mut PacketBuffer,
        layout: &mut EventLayout,
    ) -> bool {
        if guid != CHROME_PROVIDER_GUID {
            return false;
        }

        let type_index = (opcode >> 4) as usize;
        if type_index == 0 || type_index >= CHROME_INTERNAL_EVENT_TYPE_NAME.len() {
            return false;
        }

        let entry_buf_offset = buf.size();
        let entry_fields_len = layout.fields.len();

        let ok = try_decode(opcode, payload, buf, layout);
        if !ok {
            buf.reset(entry_buf_offset);
            layout.fields.truncate(entry_fields_len);
            return false;
        }

        layout.name = CHROME_INTERNAL_EVENT_TYPE_NAME[type_index].to_string();
        return true;
    }
}

fn try_decode(opcode: u8, payload: &[u8], buf: &mut PacketBuffer, layout: &mut EventLayout) -> bool {
    let mut offset = 0usize;

    let name = match read_nul_string(payload, &mut offset) {
        Some(s) => s,
        None => return false,
    };
    layout.add_field(Field::new(FieldType::String, "name", ROOT_PARENT));
    buf.encode_string(&name);

    if offset + 8 > payload.len() {
        return false;
    }
    let id = u64::from_le_bytes(payload[offset..offset + 8].try_into().unwrap());
    offset += 8;
    layout.add_field(Field::new(FieldType::Xint64, "id", ROOT_PARENT));
    buf.encode_u64(id);

    let categories = match read_nul_string(payload, &mut offset) {
        Some(s) => s,
        None => return false,
    };
    layout.add_field(Field::new(FieldType::String, "categories", ROOT_PARENT));
    buf.encode_string(&categories);

    let num_args = opcode & 0x07;
    if num_args > 0 {
        let array_index = layout.next_field_index();
        layout.add_field(
            Field::new(FieldType::ArrayFixed, "arguments", ROOT_PARENT).with_size(num_args as u64),
        );
        let struct_index = layout.next_field_index();
        layout.add_field(Field::new(FieldType::StructBegin, "arguments", array_index));
        layout.add_field(Field::new(FieldType::String, "arg_name", struct_index));
        layout.add_field(Field::new(FieldType::String, "arg_value", struct_index));
        layout.add_field(Field::new(FieldType::StructEnd, "arguments", array_index));

        for _ in 0..num_args {
            let arg_name = match read_nul_string(payload, &mut offset) {
                Some(s) => s,
                None => return false,
            };
            let arg_value = match read_nul_string(payload, &mut offset) {
                Some(s) => s,
                None => return false,
            };
            buf.encode_string(&arg_name);
            buf.encode_string(&arg_value);
        }
    }

    if opcode & 0x08 != 0 {
        if offset + 4 > payload.len() {
            return false;
        }
        let stack_size = u32::from_le_bytes(payload[offset..offset + 4].try_into().unwrap());
        offset += 4;
        layout.add_field(Field::new(FieldType::Uint32, "stack_size", ROOT_PARENT));
        buf.encode_u32(stack_size);

        let stack_array_index = layout.next_field_index();
        layout.add_field(
            Field::new(FieldType::ArrayVar, "stack", ROOT_PARENT).with_size_ref("stack_size"),
        );
        layout.add_field(Field::new(FieldType::Xint32, "stack", stack_array_index));

        let stack_bytes = stack_size as usize * 4;
        if offset + stack_bytes > payload.len() {
            return false;
        }
        buf.encode_bytes(&payload[offset..offset + stack_bytes]);
        offset += stack_bytes;
    }

    return offset == payload.len();
}

fn read_nul_string(payload: &[u8], offset: &mut usize) -> Option<String> {
    let start = *offset;
    let end = payload[start..].iter().position(|&b| b == 0)? + start;
    let s = String::from_utf8_lossy(&payload[start..end]).into_owned();
    *offset = end + 1;
    return Some(s);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_payload(name: &str, id: u64, categories: &str, args: &[(&str, &str)]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(name.as_bytes());
        p.push(0);
        p.extend_from_slice(&id.to_le_bytes());
        p.extend_from_slice(categories.as_bytes());
        p.push(0);
        for (k, v) in args {
            p.extend_from_slice(k.as_bytes());
            p.push(0);
            p.extend_from_slice(v.as_bytes());
            p.push(0);
        }
        return p;
    }

    #[test]
    fn decodes_minimal_event_with_no_args_no_stack() {
        let payload = build_payload("paint", 7, "gpu", &[]);
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), CHROME_PROVIDER_GUID, 0x10, 0, 1);
        let ok = ChromeDissector.decode(CHROME_PROVIDER_GUID, 0x10, &payload, &mut buf, &mut layout);
        assert!(ok);
        assert_eq!(layout.name, "ChromeBegin");
        assert_eq!(layout.fields.len(), 3);
    }

    #[test]
    fn decodes_event_with_two_args() {
        let payload = build_payload("paint", 7, "gpu", &[("w", "100"), ("h", "200")]);
        let opcode = 0x10 | 0x02;
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), CHROME_PROVIDER_GUID, opcode, 0, 1);
        let ok = ChromeDissector.decode(CHROME_PROVIDER_GUID, opcode, &payload, &mut buf, &mut layout);
        assert!(ok);
        assert_eq!(layout.fields.len(), 3 + 5);
    }

    #[test]
    fn wrong_guid_fails_without_mutating_anything() {
        let payload = build_payload("paint", 7, "gpu", &[]);
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), Guid::zero(), 0x10, 0, 1);
        let ok = ChromeDissector.decode(Guid::zero(), 0x10, &payload, &mut buf, &mut layout);
        assert!(!ok);
        assert_eq!(buf.size(), 0);
        assert_eq!(layout.fields.len(), 0);
    }

    #[test]
    fn trailing_bytes_fail_the_whole_decode() {
        let mut payload = build_payload("paint", 7, "gpu", &[]);
        payload.push(0xff);
        let mut buf = PacketBuffer::new();
        let mut layout = EventLayout::new(String::new(), CHROME_PROVIDER_GUID, 0x10, 0, 1);
        let ok = ChromeDissector.decode(CHROME_PROVIDER_GUID, 0x10, &payload, &mut buf, &mut layout);
        assert!(!ok);
        assert_eq!(buf.size(), 0);
        assert_eq!(layout.fields.len(), 0);
    }
}
