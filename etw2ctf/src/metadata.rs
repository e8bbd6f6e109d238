//! The metadata serializer (spec §4.9): emits the textual CTF schema that
//! describes the trace and every layout in the dictionary.

use crate::guid::Guid;
use crate::layout::{EventLayout, Field, FieldType, LayoutDictionary};

/// Renders the full `metadata` document for `dictionary`, using `trace_uuid`
/// as both the packet-header magic UUID and the `trace { uuid = ... }`
/// declaration (spec §6: the reserved trace UUID serves both roles).
pub fn write_metadata(dictionary: &LayoutDictionary, trace_uuid: &Guid) -> String {
    let mut out = String::new();

    out.push_str("/* CTF 1.8 */\n\n");
    write_typealiases(&mut out);
    write_shared_structs(&mut out);
    write_header_enums(&mut out);
    write_trace_block(&mut out, trace_uuid);
    write_stream_block(&mut out);
    write_unknown_layout(&mut out);

    for (id, layout) in dictionary.iter() {
        write_layout(&mut out, id, layout);
    }

    return out;
}

fn write_typealiases(out: &mut String) {
    out.push_str("typealias integer { size = 1; align = 1; signed = false; } := bit;\n");
    for n in 1..=31 {
        out.push_str(&format!(
            "typealias integer {{ size = {n}; align = 1; signed = false; }} := bit{n};\n"
        ));
    }
    for size in [8u32, 16, 32, 64] {
        out.push_str(&format!(
            "typealias integer {{ size = {size}; align = 8; signed = true; }} := int{size};\n"
        ));
        out.push_str(&format!(
            "typealias integer {{ size = {size}; align = 8; signed = false; }} := uint{size};\n"
        ));
        out.push_str(&format!(
            "typealias integer {{ size = {size}; align = 8; signed = false; base = 16; }} := xint{size};\n"
        ));
    }
    out.push('\n');
}

fn write_shared_structs(out: &mut String) {
    out.push_str("struct uuid {\n\txint32;\n\txint16;\n\txint16;\n\txint64;\n};\n\n");
}

fn write_header_enums(out: &mut String) {
    out.push_str("enum event_header_type : uint16 {\n");
    out.push_str("\tEVENT_HEADER_TYPE_DEFAULT = 0,\n");
    out.push_str("\tEVENT_HEADER_TYPE_EXTENDED = 1,\n");
    out.push_str("\tEVENT_HEADER_TYPE_INSTANCE = 2\n");
    out.push_str("};\n\n");

    out.push_str("struct event_header_flags {\n");
    write_bitfield_members(
        out,
        16,
        &[
            (2, "EVENT_HEADER_FLAG_EXTENDED_INFO"),
            (3, "EVENT_HEADER_FLAG_PRIVATE_SESSION"),
            (4, "EVENT_HEADER_FLAG_STRING_ONLY"),
            (5, "EVENT_HEADER_FLAG_TRACE_MESSAGE"),
            (6, "EVENT_HEADER_FLAG_NO_CPUTIME"),
            (7, "EVENT_HEADER_FLAG_32_BIT_HEADER"),
            (8, "EVENT_HEADER_FLAG_64_BIT_HEADER"),
            (9, "EVENT_HEADER_FLAG_CLASSIC_HEADER"),
        ],
    );
    out.push_str("};\n\n");

    out.push_str("struct event_header_properties {\n");
    write_bitfield_members(
        out,
        16,
        &[
            (0, "EVENT_HEADER_PROPERTY_XML"),
            (1, "EVENT_HEADER_PROPERTY_FORWARDED_XML"),
            (2, "EVENT_HEADER_PROPERTY_LEGACY_EVENTLOG"),
        ],
    );
    out.push_str("};\n\n");
}

/// Emits one `bit1 NAME;` member per named bit, padding gaps between named
/// bits (and after the last one, up to `width` bits total) with anonymous
/// `bitN` filler members so the struct's total width matches the backing
/// integer it overlays.
fn write_bitfield_members(out: &mut String, width: u32, named_bits: &[(u32, &str)]) {
    let mut cursor = 0u32;
    for &(bit, name) in named_bits {
        if bit > cursor {
            out.push_str(&format!("\tbit{} _reserved_{};\n", bit - cursor, cursor));
        }
        out.push_str(&format!("\tbit1 {name};\n"));
        cursor = bit + 1;
    }
    if width > cursor {
        out.push_str(&format!("\tbit{} _reserved_{};\n", width - cursor, cursor));
    }
}

fn write_trace_block(out: &mut String, trace_uuid: &Guid) {
    out.push_str("trace {\n");
    out.push_str("\tmajor = 1;\n");
    out.push_str("\tminor = 8;\n");
    out.push_str(&format!("\tuuid = \"{trace_uuid}\";\n"));
    out.push_str("\tbyte_order = le;\n");
    out.push_str("\tpacket.header := struct {\n");
    out.push_str("\t\tuint32 magic;\n");
    out.push_str("\t\txint8 uuid[16];\n");
    out.push_str("\t};\n");
    out.push_str("};\n\n");
}

fn write_stream_block(out: &mut String) {
    out.push_str("stream {\n");
    out.push_str("\tpacket.context := struct {\n");
    out.push_str("\t\tuint32 content_size;\n");
    out.push_str("\t\tuint32 packet_size;\n");
    out.push_str("\t\tuint64 timestamp_begin;\n");
    out.push_str("\t\tuint64 timestamp_end;\n");
    out.push_str("\t};\n");
    out.push_str("\tevent.header := struct {\n");
    out.push_str("\t\tuint64 timestamp;\n");
    out.push_str("\t\tuint32 id;\n");
    out.push_str("\t};\n");
    out.push_str("\tevent.context := struct {\n");
    out.push_str("\t\tuint16 ev_id;\n");
    out.push_str("\t\tuint8 ev_version;\n");
    out.push_str("\t\tuint8 ev_channel;\n");
    out.push_str("\t\tuint8 ev_level;\n");
    out.push_str("\t\tuint8 ev_opcode;\n");
    out.push_str("\t\tuint16 ev_task;\n");
    out.push_str("\t\txint64 ev_keyword;\n");
    out.push_str("\t\tuint32 pid;\n");
    out.push_str("\t\tuint32 tid;\n");
    out.push_str("\t\tuint8 cpu_id;\n");
    out.push_str("\t\tuint16 logger_id;\n");
    out.push_str("\t\tstruct uuid provider;\n");
    out.push_str("\t\tstruct uuid activity;\n");
    out.push_str("\t\tenum event_header_type header_type;\n");
    out.push_str("\t\txint16 header_flags_hex;\n");
    out.push_str("\t\tstruct event_header_flags header_flags_bits;\n");
    out.push_str("\t\txint16 header_properties_hex;\n");
    out.push_str("\t\tstruct event_header_properties header_properties_bits;\n");
    out.push_str("\t\tuint8 cpu_id_repeated;\n");
    out.push_str("\t};\n");
    out.push_str("};\n\n");
}

fn write_unknown_layout(out: &mut String) {
    out.push_str("event {\n\tid = 0;\n\tname = \"unknown\";\n");
    out.push_str("\tfields := struct {\n\t\tuint8 cpuid;\n\t};\n");
    out.push_str("};\n\n");
}

fn write_layout(out: &mut String, id: u64, layout: &EventLayout) {
    out.push_str(&format!(
        "// guid: {} opcode: {} version: {} id: {}\n",
        layout.guid, layout.opcode, layout.version, layout.event_id
    ));
    out.push_str("event {\n");
    out.push_str(&format!("\tid = {id};\n"));
    out.push_str(&format!("\tname = \"{}\";\n", layout.name));
    out.push_str("\tfields := struct {\n\t\tuint8 cpuid;\n");
    let body = render_scope(&layout.fields, crate::layout::ROOT_PARENT);
    for line in body.lines() {
        out.push_str("\t\t");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("\t};\n");
    out.push_str("};\n\n");
}

/// Renders the fields whose `parent` is `parent`, respecting STRUCT nesting
/// and applying ARRAY_FIXED/ARRAY_VAR size suffixes to the next declaration
/// in the same scope (spec §4.9 item 8).
fn render_scope(fields: &[Field], parent: u64) -> String {
    let siblings: Vec<(usize, &Field)> = fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.parent == parent)
        .collect();

    let mut out = String::new();
    let mut i = 0;
    while i < siblings.len() {
        let (idx, field) = siblings[i];
        match field.field_type {
            FieldType::ArrayFixed | FieldType::ArrayVar => {
                // The array's element declaration is not a same-level
                // sibling: both the plain-scalar and struct-element cases
                // nest the element(s) under the array field's own slot
                // index as `parent` (mirroring how STRUCT_BEGIN/STRUCT_END
                // scope their own members), so look it up there instead of
                // in `siblings`.
                let suffix = match field.field_type {
                    FieldType::ArrayFixed => format!("[{}]", field.size),
                    FieldType::ArrayVar => format!("[{}]", field.field_size_ref),
                    _ => unreachable!(),
                };
                let array_scope = idx as u64;
                if let Some((child_idx, child)) = fields
                    .iter()
                    .enumerate()
                    .find(|(_, f)| f.parent == array_scope)
                {
                    if child.field_type == FieldType::StructBegin {
                        let inner = render_scope(fields, child_idx as u64);
                        out.push_str("struct {\n");
                        for line in inner.lines() {
                            out.push_str("\t");
                            out.push_str(line);
                            out.push('\n');
                        }
                        out.push_str(&format!("}} {}{};\n", child.name, suffix));
                    } else {
                        out.push_str(&scalar_decl(child, Some(&suffix)));
                    }
                }
                i += 1;
            }
            FieldType::StructBegin => {
                let inner = render_scope(fields, idx as u64);
                out.push_str("struct {\n");
                for line in inner.lines() {
                    out.push_str("\t");
                    out.push_str(line);
                    out.push('\n');
                }
                out.push_str(&format!("}} {};\n", field.name));
                i += 1;
                if i < siblings.len() && siblings[i].1.field_type == FieldType::StructEnd {
                    i += 1;
                }
            }
            FieldType::StructEnd => {
                i += 1;
            }
            _ => {
                out.push_str(&scalar_decl(field, None));
                i += 1;
            }
        }
    }

    return out;
}

fn scalar_decl(field: &Field, suffix: Option<&str>) -> String {
    let suffix = suffix.unwrap_or("");
    return match field.field_type {
        FieldType::BinaryFixed => format!("uint8 {}[{}]{};\n", field.name, field.size, suffix),
        FieldType::BinaryVar => {
            format!("uint8 {}[{}]{};\n", field.name, field.field_size_ref, suffix)
        }
        other => format!("{} {}{};\n", ctf_type_name(other), field.name, suffix),
    };
}

fn ctf_type_name(field_type: FieldType) -> &'static str {
    return match field_type {
        FieldType::Int8 => "int8",
        FieldType::Int16 => "int16",
        FieldType::Int32 => "int32",
        FieldType::Int64 => "int64",
        FieldType::Uint8 => "uint8",
        FieldType::Uint16 => "uint16",
        FieldType::Uint32 => "uint32",
        FieldType::Uint64 => "uint64",
        FieldType::Xint8 => "xint8",
        FieldType::Xint16 => "xint16",
        FieldType::Xint32 => "xint32",
        FieldType::Xint64 => "xint64",
        FieldType::String => "string",
        FieldType::Guid => "struct uuid",
        _ => "uint8",
    };
}
