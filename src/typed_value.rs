//! Typed property values (MS-OLEPS `TypedPropertyValue`).
//!
//! A typed value is a 4 byte type tag (a 16 bit `VARTYPE` followed by 16 bits of padding)
//! and a tag dependent payload. The catalog below is deliberately incomplete: a tag it does not
//! know yields an absent value instead of an error, because the payload length of an unknown
//! type cannot be derived and one unknown property must not take down its siblings.

use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::{ByteCursor, filetime_to_timestamp, ole_date_to_timestamp};
use crate::wps_parser::ParserSettings;

use encoding::DecoderTrap;
use jiff::Timestamp;
use log::{trace, warn};
use serde::{Serialize, Serializer};
use serde_json::{Value, json};
use winstructs::guid::Guid;

use std::fmt::Write;

pub const VT_EMPTY: u16 = 0x0000;
pub const VT_NULL: u16 = 0x0001;
pub const VT_I2: u16 = 0x0002;
pub const VT_I4: u16 = 0x0003;
pub const VT_R4: u16 = 0x0004;
pub const VT_R8: u16 = 0x0005;
pub const VT_CY: u16 = 0x0006;
pub const VT_DATE: u16 = 0x0007;
pub const VT_BSTR: u16 = 0x0008;
pub const VT_ERROR: u16 = 0x000A;
pub const VT_BOOL: u16 = 0x000B;
pub const VT_VARIANT: u16 = 0x000C;
pub const VT_DECIMAL: u16 = 0x000E;
pub const VT_I1: u16 = 0x0010;
pub const VT_UI1: u16 = 0x0011;
pub const VT_UI2: u16 = 0x0012;
pub const VT_UI4: u16 = 0x0013;
pub const VT_I8: u16 = 0x0014;
pub const VT_UI8: u16 = 0x0015;
pub const VT_INT: u16 = 0x0016;
pub const VT_UINT: u16 = 0x0017;
pub const VT_LPSTR: u16 = 0x001E;
pub const VT_LPWSTR: u16 = 0x001F;
pub const VT_FILETIME: u16 = 0x0040;
pub const VT_BLOB: u16 = 0x0041;
pub const VT_STREAM: u16 = 0x0042;
pub const VT_STORAGE: u16 = 0x0043;
pub const VT_STREAMED_OBJECT: u16 = 0x0044;
pub const VT_STORED_OBJECT: u16 = 0x0045;
pub const VT_BLOB_OBJECT: u16 = 0x0046;
pub const VT_CF: u16 = 0x0047;
pub const VT_CLSID: u16 = 0x0048;
pub const VT_VERSIONED_STREAM: u16 = 0x0049;
pub const VT_VECTOR: u16 = 0x1000;
pub const VT_ARRAY: u16 = 0x2000;

const VT_TYPE_MASK: u16 = 0x0FFF;

/// Human readable name of a type tag, e.g. `VT_VECTOR|VT_LPWSTR`.
pub fn var_type_name(tag: u32) -> String {
    let vt = tag as u16;
    let base = match vt & VT_TYPE_MASK {
        VT_EMPTY => "VT_EMPTY",
        VT_NULL => "VT_NULL",
        VT_I2 => "VT_I2",
        VT_I4 => "VT_I4",
        VT_R4 => "VT_R4",
        VT_R8 => "VT_R8",
        VT_CY => "VT_CY",
        VT_DATE => "VT_DATE",
        VT_BSTR => "VT_BSTR",
        VT_ERROR => "VT_ERROR",
        VT_BOOL => "VT_BOOL",
        VT_VARIANT => "VT_VARIANT",
        VT_DECIMAL => "VT_DECIMAL",
        VT_I1 => "VT_I1",
        VT_UI1 => "VT_UI1",
        VT_UI2 => "VT_UI2",
        VT_UI4 => "VT_UI4",
        VT_I8 => "VT_I8",
        VT_UI8 => "VT_UI8",
        VT_INT => "VT_INT",
        VT_UINT => "VT_UINT",
        VT_LPSTR => "VT_LPSTR",
        VT_LPWSTR => "VT_LPWSTR",
        VT_FILETIME => "VT_FILETIME",
        VT_BLOB => "VT_BLOB",
        VT_STREAM => "VT_STREAM",
        VT_STORAGE => "VT_STORAGE",
        VT_STREAMED_OBJECT => "VT_STREAMED_OBJECT",
        VT_STORED_OBJECT => "VT_STORED_OBJECT",
        VT_BLOB_OBJECT => "VT_BLOB_OBJECT",
        VT_CF => "VT_CF",
        VT_CLSID => "VT_CLSID",
        VT_VERSIONED_STREAM => "VT_VERSIONED_STREAM",
        _ => return format!("0x{tag:08X}"),
    };

    let mut name = String::new();
    if vt & VT_VECTOR != 0 {
        name.push_str("VT_VECTOR|");
    }
    if vt & VT_ARRAY != 0 {
        name.push_str("VT_ARRAY|");
    }
    name.push_str(base);
    name
}

#[derive(Debug, PartialEq, Clone)]
pub enum TypedValue {
    Empty,
    Null,
    I1(i8),
    I2(i16),
    I4(i32),
    I8(i64),
    UI1(u8),
    UI2(u16),
    UI4(u32),
    UI8(u64),
    R4(f32),
    R8(f64),
    /// `VT_CY`, a fixed point number scaled by 10,000.
    Currency(i64),
    Date(Timestamp),
    Bool(bool),
    /// `VT_ERROR`, an HRESULT.
    Error(u32),
    String(String),
    FileTime(Timestamp),
    Blob(Vec<u8>),
    Clsid(Guid),
    Vector(Vec<TypedValue>),
}

/// The content of a property value: the raw type tag and its decoded payload.
///
/// `value` is `None` when the tag is not supported by the decoder, or when the payload of a
/// supported tag failed to decode.
#[derive(Debug, PartialEq, Clone)]
pub struct TypedPropertyValue {
    pub var_type: u32,
    pub value: Option<TypedValue>,
}

impl TypedPropertyValue {
    pub fn type_name(&self) -> String {
        var_type_name(self.var_type)
    }
}

/// Decode the payload of a typed value with tag `var_type`.
///
/// Returns `Ok(None)` for unsupported tags. `offset` is the absolute offset of `payload[0]`.
pub fn decode_typed_value(
    var_type: u32,
    payload: &[u8],
    offset: u64,
    settings: &ParserSettings,
) -> DeserializationResult<Option<TypedValue>> {
    let mut cursor = ByteCursor::with_base(payload, offset);
    read_tagged(var_type, &mut cursor, settings, 0)
}

fn read_tagged(
    var_type: u32,
    cursor: &mut ByteCursor<'_>,
    settings: &ParserSettings,
    depth: usize,
) -> DeserializationResult<Option<TypedValue>> {
    trace!(
        "Offset `0x{offset:08x} ({offset})`: {name}",
        offset = cursor.position(),
        name = var_type_name(var_type)
    );

    // The upper 16 bits are padding.
    let vt = var_type as u16;
    if vt & VT_ARRAY != 0 {
        return Ok(unsupported(var_type, cursor));
    }

    if vt & VT_VECTOR != 0 {
        return read_vector(vt & VT_TYPE_MASK, cursor, settings, depth)
            .map(|values| values.map(TypedValue::Vector));
    }

    if vt == VT_EMPTY {
        return Ok(Some(TypedValue::Empty));
    }
    if vt == VT_NULL {
        return Ok(Some(TypedValue::Null));
    }

    match read_scalar(vt, cursor, settings, false)? {
        Some(value) => Ok(Some(value)),
        None => Ok(unsupported(var_type, cursor)),
    }
}

fn unsupported(var_type: u32, cursor: &ByteCursor<'_>) -> Option<TypedValue> {
    warn!(
        "unsupported typed value {} at offset {}, treating as absent",
        var_type_name(var_type),
        cursor.position()
    );
    None
}

/// Read one scalar of type `vt`.
///
/// Scalars of a standalone value are padded to 4 bytes, elements of a vector are packed, except
/// for the variable length types, which are padded in both cases.
fn read_scalar(
    vt: u16,
    cursor: &mut ByteCursor<'_>,
    settings: &ParserSettings,
    packed: bool,
) -> DeserializationResult<Option<TypedValue>> {
    let start = cursor.pos();

    let value = match vt {
        VT_I1 => TypedValue::I1(cursor.u8_named("VT_I1")? as i8),
        VT_UI1 => TypedValue::UI1(cursor.u8_named("VT_UI1")?),
        VT_I2 => TypedValue::I2(i16::from_le_bytes(cursor.array::<2>("VT_I2")?)),
        VT_UI2 => TypedValue::UI2(cursor.u16_named("VT_UI2")?),
        VT_I4 | VT_INT => TypedValue::I4(i32::from_le_bytes(cursor.array::<4>("VT_I4")?)),
        VT_UI4 | VT_UINT => TypedValue::UI4(cursor.u32_named("VT_UI4")?),
        VT_I8 => TypedValue::I8(i64::from_le_bytes(cursor.array::<8>("VT_I8")?)),
        VT_UI8 => TypedValue::UI8(cursor.u64_named("VT_UI8")?),
        VT_R4 => TypedValue::R4(f32::from_le_bytes(cursor.array::<4>("VT_R4")?)),
        VT_R8 => TypedValue::R8(f64::from_le_bytes(cursor.array::<8>("VT_R8")?)),
        VT_CY => TypedValue::Currency(i64::from_le_bytes(cursor.array::<8>("VT_CY")?)),
        VT_DATE => {
            let at = cursor.position();
            let days = f64::from_le_bytes(cursor.array::<8>("VT_DATE")?);
            TypedValue::Date(ole_date_to_timestamp(days, at)?)
        }
        VT_ERROR => TypedValue::Error(cursor.u32_named("VT_ERROR")?),
        VT_BOOL => {
            let raw = cursor.u16_named("VT_BOOL")?;
            if raw != 0 && raw != 0xFFFF {
                warn!(
                    "invalid boolean value {:#06x} at offset {}; treating as true",
                    raw,
                    cursor.position()
                );
            }
            TypedValue::Bool(raw != 0)
        }
        VT_FILETIME => {
            let at = cursor.position();
            TypedValue::FileTime(filetime_to_timestamp(cursor.u64_named("VT_FILETIME")?, at)?)
        }
        VT_CLSID => {
            let at = cursor.position();
            let bytes = cursor.take_bytes(16, "VT_CLSID")?;
            let guid = Guid::from_buffer(bytes).map_err(|_| DeserializationError::Truncated {
                what: "VT_CLSID",
                offset: at,
                need: 16,
                have: bytes.len(),
            })?;
            TypedValue::Clsid(guid)
        }
        VT_BSTR => read_bstr(cursor)?,
        VT_LPSTR => read_lpstr(cursor, settings)?,
        VT_LPWSTR => read_lpwstr(cursor)?,
        VT_BLOB => {
            let size = cursor.u32_named("VT_BLOB size")? as usize;
            TypedValue::Blob(cursor.take_bytes(size, "VT_BLOB")?.to_vec())
        }
        _ => return Ok(None),
    };

    // Variable length payloads are padded even inside a vector.
    let variable_length = matches!(vt, VT_BSTR | VT_LPSTR | VT_LPWSTR | VT_BLOB);
    if !packed || variable_length {
        cursor.skip_padding(start, 4);
    }

    Ok(Some(value))
}

/// `VT_BSTR`: a byte count (including the terminator) followed by UTF-16LE text.
fn read_bstr(cursor: &mut ByteCursor<'_>) -> DeserializationResult<TypedValue> {
    let size = cursor.u32_named("VT_BSTR size")? as usize;
    Ok(TypedValue::String(cursor.utf16_by_size(size, "VT_BSTR")?))
}

/// `VT_LPSTR`: a byte count (including the terminator) followed by text in the ANSI code page.
fn read_lpstr(
    cursor: &mut ByteCursor<'_>,
    settings: &ParserSettings,
) -> DeserializationResult<TypedValue> {
    let size = cursor.u32_named("VT_LPSTR size")? as usize;
    let raw = cursor.take_bytes(size, "VT_LPSTR")?;
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());

    let codec = settings.get_ansi_codec();
    let decoded = codec
        .decode(&raw[..end], DecoderTrap::Strict)
        .map_err(|m| DeserializationError::AnsiDecodeError {
            encoding_used: codec.name(),
            inner_message: m.to_string(),
        })?;
    Ok(TypedValue::String(decoded))
}

/// `VT_LPWSTR`: a character count (including the terminator) followed by UTF-16LE text.
fn read_lpwstr(cursor: &mut ByteCursor<'_>) -> DeserializationResult<TypedValue> {
    let at = cursor.position();
    let chars = cursor.u32_named("VT_LPWSTR length")? as usize;
    let size = chars
        .checked_mul(2)
        .ok_or(DeserializationError::Truncated {
            what: "VT_LPWSTR",
            offset: at,
            need: usize::MAX,
            have: cursor.remaining_len(),
        })?;
    Ok(TypedValue::String(cursor.utf16_by_size(size, "VT_LPWSTR")?))
}

/// Smallest encoded size of one element of a vector of `vt`, used to reject absurd counts
/// before allocating.
fn min_element_size(vt: u16) -> usize {
    match vt {
        VT_I1 | VT_UI1 => 1,
        VT_I2 | VT_UI2 | VT_BOOL => 2,
        VT_I8 | VT_UI8 | VT_R8 | VT_CY | VT_DATE | VT_FILETIME => 8,
        VT_CLSID => 16,
        _ => 4,
    }
}

fn read_vector(
    vt: u16,
    cursor: &mut ByteCursor<'_>,
    settings: &ParserSettings,
    depth: usize,
) -> DeserializationResult<Option<Vec<TypedValue>>> {
    let start = cursor.pos();
    let at = cursor.position();
    let count = cursor.u32_named("vector length")?;

    let fits = (count as usize)
        .checked_mul(min_element_size(vt))
        .is_some_and(|need| need <= cursor.remaining_len());
    if !fits || count as usize > settings.get_max_vector_len() {
        return Err(DeserializationError::VectorTooLarge { count, offset: at });
    }

    let mut values = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let value = if vt == VT_VARIANT {
            if depth >= settings.get_max_variant_depth() {
                return Err(DeserializationError::NestingTooDeep {
                    offset: cursor.position(),
                    depth,
                });
            }
            let element_type = cursor.u32_named("variant type")?;
            read_tagged(element_type, cursor, settings, depth + 1)?
        } else {
            read_scalar(vt, cursor, settings, true)?
        };

        match value {
            Some(value) => values.push(value),
            // Elements following an unsupported one cannot be located.
            None => {
                warn!(
                    "vector of {} at offset {} has an unsupported element, treating as absent",
                    var_type_name(u32::from(vt | VT_VECTOR)),
                    at
                );
                return Ok(None);
            }
        }
    }

    cursor.skip_padding(start, 4);
    Ok(Some(values))
}

fn hex(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02X}", b);
    }
    s
}

impl From<&TypedValue> for Value {
    fn from(value: &TypedValue) -> Self {
        match value {
            TypedValue::Empty | TypedValue::Null => Value::Null,
            TypedValue::I1(num) => json!(num),
            TypedValue::I2(num) => json!(num),
            TypedValue::I4(num) => json!(num),
            TypedValue::I8(num) => json!(num),
            TypedValue::UI1(num) => json!(num),
            TypedValue::UI2(num) => json!(num),
            TypedValue::UI4(num) => json!(num),
            TypedValue::UI8(num) => json!(num),
            TypedValue::R4(num) => json!(num),
            TypedValue::R8(num) => json!(num),
            TypedValue::Currency(num) => json!(*num as f64 / 10_000.0),
            TypedValue::Date(ts) | TypedValue::FileTime(ts) => json!(ts.to_string()),
            TypedValue::Bool(b) => json!(b),
            TypedValue::Error(hresult) => json!(format!("0x{:08X}", hresult)),
            TypedValue::String(s) => json!(s),
            TypedValue::Blob(bytes) => json!(hex(bytes)),
            TypedValue::Clsid(guid) => json!(guid.to_string()),
            TypedValue::Vector(values) => Value::Array(values.iter().map(Value::from).collect()),
        }
    }
}

impl Serialize for TypedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Value::from(self).serialize(serializer)
    }
}

impl Serialize for TypedPropertyValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        json!({
            "type": self.type_name(),
            "value": self.value.as_ref().map(Value::from),
        })
        .serialize(serializer)
    }
}
