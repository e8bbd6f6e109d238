//! The scalar decoder: the in/out-type dispatch table of spec §4.4.

use crate::error::DecodeError;
use crate::layout::{Field, FieldType};
use crate::packet::PacketBuffer;
use crate::provider::{InType, OutType};

/// Decodes one scalar property value: appends its encoded representation to
/// `buf` and returns the [`Field`] descriptor it corresponds to.
///
/// On failure the packet is left untouched -- callers that pre-recorded
/// `buf.size()` before calling this do not need to roll back themselves for
/// *this* call, but the payload decoder still snapshots the offset for its
/// own multi-field rollback.
pub fn decode_scalar(
    parent: u64,
    name: &str,
    in_type: InType,
    out_type: OutType,
    size: usize,
    bytes: &[u8],
    buf: &mut PacketBuffer,
) -> Result<Field, DecodeError> {
    use InType::*;

    match in_type {
        UnicodeString => {
            let text = decode_utf16_nul_terminated(bytes);
            buf.encode_string(&text);
            return Ok(Field::new(FieldType::String, name, parent));
        }
        AnsiString => {
            let text = decode_ansi_nul_terminated(bytes);
            buf.encode_string(&text);
            return Ok(Field::new(FieldType::String, name, parent));
        }
        UnicodeChar => {
            if size != 2 || bytes.len() < 2 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            buf.encode_u16(v);
            return Ok(Field::new(FieldType::Xint16, name, parent));
        }
        AnsiChar | Int8 | Uint8 => {
            if size != 1 || bytes.is_empty() {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let v = bytes[0];
            buf.encode_u8(v);
            let field_type = match out_type {
                OutType::HexInt8 => FieldType::Xint8,
                OutType::Byte => FieldType::Int8,
                OutType::UnsignedByte => FieldType::Uint8,
                OutType::Default => {
                    if in_type == Int8 {
                        FieldType::Int8
                    } else {
                        FieldType::Uint8
                    }
                }
                _ => return Err(DecodeError::UnrecognizedScalarType),
            };
            return Ok(Field::new(field_type, name, parent));
        }
        Int16 | Uint16 => {
            if size != 2 || bytes.len() < 2 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let v = u16::from_le_bytes([bytes[0], bytes[1]]);
            buf.encode_u16(v);
            let field_type = match out_type {
                OutType::HexInt16 => FieldType::Xint16,
                OutType::Short => FieldType::Int16,
                OutType::UnsignedShort => FieldType::Uint16,
                OutType::Default => {
                    if in_type == Int16 {
                        FieldType::Int16
                    } else {
                        FieldType::Uint16
                    }
                }
                _ => return Err(DecodeError::UnrecognizedScalarType),
            };
            return Ok(Field::new(field_type, name, parent));
        }
        Int32 | Uint32 => {
            if size != 4 || bytes.len() < 4 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            buf.encode_u32(v);
            let field_type = match out_type {
                OutType::HexInt32 => FieldType::Xint32,
                OutType::Int => FieldType::Int32,
                OutType::UnsignedInt => FieldType::Uint32,
                OutType::Default => {
                    if in_type == Int32 {
                        FieldType::Int32
                    } else {
                        FieldType::Uint32
                    }
                }
                _ => return Err(DecodeError::UnrecognizedScalarType),
            };
            return Ok(Field::new(field_type, name, parent));
        }
        Int64 | Uint64 => {
            if size != 8 || bytes.len() < 8 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let v = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
            buf.encode_u64(v);
            let field_type = match out_type {
                OutType::HexInt64 => FieldType::Xint64,
                OutType::Default => {
                    if in_type == Int64 {
                        FieldType::Int64
                    } else {
                        FieldType::Uint64
                    }
                }
                _ => return Err(DecodeError::UnrecognizedScalarType),
            };
            return Ok(Field::new(field_type, name, parent));
        }
        Boolean => {
            if size != 1 && size != 4 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            if bytes.len() < size {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            let nonzero = bytes[..size].iter().any(|&b| b != 0);
            buf.encode_u8(nonzero as u8);
            return Ok(Field::new(FieldType::Uint8, name, parent));
        }
        Guid => {
            if size != 16 || bytes.len() < 16 {
                return Err(DecodeError::UnrecognizedScalarType);
            }
            buf.encode_bytes(&bytes[..16]);
            return Ok(Field::new(FieldType::Guid, name, parent));
        }
        Pointer | SizeT => match size {
            4 => {
                if bytes.len() < 4 {
                    return Err(DecodeError::UnrecognizedScalarType);
                }
                let v = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                buf.encode_u32(v);
                return Ok(Field::new(FieldType::Xint32, name, parent));
            }
            8 => {
                if bytes.len() < 8 {
                    return Err(DecodeError::UnrecognizedScalarType);
                }
                let v = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
                buf.encode_u64(v);
                return Ok(Field::new(FieldType::Xint64, name, parent));
            }
            _ => return Err(DecodeError::UnrecognizedScalarType),
        },
    }
}

/// Decodes a nul-terminated UTF-16LE byte range. Per spec §9's Design Note,
/// this UTF-8-encodes the text rather than truncating each code unit to 8
/// bits, which is correct only for code units `<= 0xFF`.
fn decode_utf16_nul_terminated(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    return String::from_utf16_lossy(&units);
}

fn decode_ansi_nul_terminated(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    return String::from_utf8_lossy(&bytes[..end]).into_owned();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::ROOT_PARENT;

    #[test]
    fn uint32_default_out_type() {
        let mut buf = PacketBuffer::new();
        let field = decode_scalar(
            ROOT_PARENT,
            "value",
            InType::Uint32,
            OutType::Default,
            4,
            &42u32.to_le_bytes(),
            &mut buf,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Uint32);
        assert_eq!(buf.raw(), &42u32.to_le_bytes());
    }

    #[test]
    fn hex_int32_out_type() {
        let mut buf = PacketBuffer::new();
        let field = decode_scalar(
            ROOT_PARENT,
            "value",
            InType::Uint32,
            OutType::HexInt32,
            4,
            &0xFFu32.to_le_bytes(),
            &mut buf,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Xint32);
    }

    #[test]
    fn wrong_size_is_a_decode_error() {
        let mut buf = PacketBuffer::new();
        let result = decode_scalar(
            ROOT_PARENT,
            "value",
            InType::Uint32,
            OutType::Default,
            2,
            &[0, 0],
            &mut buf,
        );
        assert!(result.is_err());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn boolean_carries_nonzero() {
        let mut buf = PacketBuffer::new();
        let field = decode_scalar(
            ROOT_PARENT,
            "flag",
            InType::Boolean,
            OutType::Default,
            4,
            &5u32.to_le_bytes(),
            &mut buf,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::Uint8);
        assert_eq!(buf.raw(), &[1u8]);
    }

    #[test]
    fn unicode_string_utf8_encodes() {
        let mut buf = PacketBuffer::new();
        let mut wide: Vec<u8> = Vec::new();
        for u in "hi".encode_utf16() {
            wide.extend_from_slice(&u.to_le_bytes());
        }
        wide.extend_from_slice(&[0, 0]);
        let field = decode_scalar(
            ROOT_PARENT,
            "data",
            InType::UnicodeString,
            OutType::Default,
            wide.len(),
            &wide,
            &mut buf,
        )
        .unwrap();
        assert_eq!(field.field_type, FieldType::String);
        assert_eq!(buf.raw(), b"hi\0");
    }
}
