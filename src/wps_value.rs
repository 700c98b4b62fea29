use crate::err::{DecodeFailure, DeserializationError, DeserializationResult};
use crate::field_engine::{FieldDecl, FieldSet, Layout, LazyStructure, ParsedFields};
use crate::typed_value::{TypedPropertyValue, decode_typed_value};
use crate::utils::{ByteCursor, SubView};
use crate::wps_parser::ParserSettings;

use log::{trace, warn};
use serde::Serialize;

/// `ValueSize` + `Id`/`NameSize` + `Reserved`.
pub const VALUE_HEADER_LEN: usize = 9;

/// How the properties of a storage are named, chosen once per storage from its format id.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub enum NameEncoding {
    /// Names are UTF-16 strings (the "dictionary" format id).
    StringNamed,
    /// Names are 32 bit property ids.
    IntegerNamed,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ValueHeader {
    /// Size of the whole value record, including this header. Zero marks the end of the list.
    pub value_size: u32,
    /// Property id. Not present on disk for string named values, which always report `0`.
    pub id: u32,
    /// Size in bytes of the UTF-16 name which follows the header, string named values only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name_size: Option<u32>,
    pub reserved: u8,
}

impl ValueHeader {
    pub fn is_terminal(&self) -> bool {
        self.value_size == 0x00
    }

    fn terminal(encoding: NameEncoding) -> Self {
        ValueHeader {
            value_size: 0,
            id: 0,
            name_size: match encoding {
                NameEncoding::StringNamed => Some(0),
                NameEncoding::IntegerNamed => None,
            },
            reserved: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyValue {
    pub header: ValueHeader,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub value: Option<TypedPropertyValue>,
    /// Set when the payload of `value` failed to decode inside an otherwise intact record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DecodeFailure>,
}

impl PropertyValue {
    pub fn is_terminal(&self) -> bool {
        self.header.is_terminal()
    }

    /// Decode one value record which starts at the beginning of `view`.
    pub(crate) fn decode(
        view: SubView<'_>,
        encoding: NameEncoding,
        settings: &ParserSettings,
    ) -> DeserializationResult<PropertyValue> {
        match encoding {
            NameEncoding::IntegerNamed => {
                let parsed = LazyStructure::<IntegerNamedValue>::new(view, settings).parse()?;
                Self::from_fields::<IntegerNamedValue>(parsed)
            }
            NameEncoding::StringNamed => {
                let parsed = LazyStructure::<StringNamedValue>::new(view, settings).parse()?;
                Self::from_fields::<StringNamedValue>(parsed)
            }
        }
    }

    fn from_fields<L: Layout<Value = ValueField>>(
        mut parsed: ParsedFields<ValueField>,
    ) -> DeserializationResult<PropertyValue> {
        match parsed.short_after {
            Some(field) => trace!("{} ended after `{}`", L::STRUCTURE, field),
            None => trace!("{} read {} bytes", L::STRUCTURE, parsed.end),
        }

        let header = match parsed.fields.take(HEADER) {
            Some(ValueField::Header(header)) => header,
            _ => {
                return Err(DeserializationError::FieldNotEvaluated {
                    structure: L::STRUCTURE,
                    field: HEADER,
                });
            }
        };
        let name = match parsed.fields.take(NAME) {
            Some(ValueField::Name(name)) => Some(name),
            _ => None,
        };
        let (value, failure) = match parsed.fields.take(VALUE) {
            Some(ValueField::Value(value, failure)) => (Some(value), failure),
            _ => (None, None),
        };

        Ok(PropertyValue {
            header,
            name,
            value,
            failure,
        })
    }
}

const HEADER: &str = "header";
const NAME: &str = "name";
const VALUE: &str = "value";

pub(crate) enum ValueField {
    Header(ValueHeader),
    Name(String),
    Value(TypedPropertyValue, Option<DecodeFailure>),
}

fn header(fields: &FieldSet<ValueField>) -> DeserializationResult<&ValueHeader> {
    match fields.require(HEADER)? {
        ValueField::Header(header) => Ok(header),
        _ => Err(DeserializationError::FieldNotEvaluated {
            structure: "PropertyValue",
            field: HEADER,
        }),
    }
}

/// Both variants stop right after a zero sized header.
fn header_is_not_terminal(field: &'static str, fields: &FieldSet<ValueField>) -> bool {
    !(field == HEADER && header(fields).is_ok_and(ValueHeader::is_terminal))
}

/// Reads `ValueSize`, and nothing else if it is zero.
fn read_value_size(
    cursor: &mut ByteCursor<'_>,
    encoding: NameEncoding,
) -> DeserializationResult<Option<u32>> {
    let start = cursor.position();
    let value_size = cursor.u32_named("property value size")?;
    if value_size == 0 {
        trace!("Offset {}: terminal property value", start);
        return Ok(None);
    }
    if (value_size as usize) < VALUE_HEADER_LEN {
        return Err(DeserializationError::NonAdvancingRecord {
            what: match encoding {
                NameEncoding::StringNamed => "string named property value",
                NameEncoding::IntegerNamed => "integer named property value",
            },
            offset: start,
            size: value_size,
            minimum: VALUE_HEADER_LEN,
        });
    }
    Ok(Some(value_size))
}

fn read_integer_name_header(
    cursor: &mut ByteCursor<'_>,
    _fields: &FieldSet<ValueField>,
    _settings: &ParserSettings,
) -> DeserializationResult<ValueField> {
    let Some(value_size) = read_value_size(cursor, NameEncoding::IntegerNamed)? else {
        return Ok(ValueField::Header(ValueHeader::terminal(
            NameEncoding::IntegerNamed,
        )));
    };
    let id = cursor.u32_named("property id")?;
    let reserved = cursor.u8_named("property value reserved")?;

    Ok(ValueField::Header(ValueHeader {
        value_size,
        id,
        name_size: None,
        reserved,
    }))
}

fn read_string_name_header(
    cursor: &mut ByteCursor<'_>,
    _fields: &FieldSet<ValueField>,
    _settings: &ParserSettings,
) -> DeserializationResult<ValueField> {
    let Some(value_size) = read_value_size(cursor, NameEncoding::StringNamed)? else {
        return Ok(ValueField::Header(ValueHeader::terminal(
            NameEncoding::StringNamed,
        )));
    };
    let name_size = cursor.u32_named("property name size")?;
    let reserved = cursor.u8_named("property value reserved")?;

    Ok(ValueField::Header(ValueHeader {
        value_size,
        id: 0,
        name_size: Some(name_size),
        reserved,
    }))
}

/// Bytes left in the record, measured from the cursor.
fn record_remaining(cursor: &ByteCursor<'_>, header: &ValueHeader) -> usize {
    (header.value_size as usize).saturating_sub(cursor.pos())
}

fn read_name(
    cursor: &mut ByteCursor<'_>,
    fields: &FieldSet<ValueField>,
    _settings: &ParserSettings,
) -> DeserializationResult<ValueField> {
    let header = header(fields)?;
    let name_size = header.name_size.unwrap_or_default() as usize;

    let available = record_remaining(cursor, header);
    if name_size > available {
        return Err(DeserializationError::Truncated {
            what: "property name",
            offset: cursor.position(),
            need: name_size,
            have: available,
        });
    }

    Ok(ValueField::Name(cursor.utf16_by_size(name_size, "property name")?))
}

/// Shared by both variants: the typed value spans from the cursor to the end of the record.
///
/// A payload which fails to decode leaves the value absent. The record size still locates the
/// next value, so only a missing type tag is an error here.
fn read_typed_value(
    cursor: &mut ByteCursor<'_>,
    fields: &FieldSet<ValueField>,
    settings: &ParserSettings,
) -> DeserializationResult<ValueField> {
    let header = header(fields)?;
    let offset = cursor.position();
    let record = cursor.take_bytes(record_remaining(cursor, header), "typed property value")?;

    let mut typed = ByteCursor::with_base(record, offset);
    let var_type = typed.u32_named("typed value type")?;

    match decode_typed_value(var_type, typed.remaining(), typed.position(), settings) {
        Ok(value) => Ok(ValueField::Value(
            TypedPropertyValue { var_type, value },
            None,
        )),
        Err(err) => {
            warn!("Offset {}: dropping typed property value: {}", offset, err);
            Ok(ValueField::Value(
                TypedPropertyValue {
                    var_type,
                    value: None,
                },
                Some(DecodeFailure::from(&err)),
            ))
        }
    }
}

pub(crate) struct IntegerNamedValue;

impl Layout for IntegerNamedValue {
    type Value = ValueField;

    const STRUCTURE: &'static str = "PropertyValue(integer name)";
    const FIELDS: &'static [FieldDecl<ValueField>] = &[
        FieldDecl {
            name: HEADER,
            deps: &[],
            evaluate: read_integer_name_header,
        },
        FieldDecl {
            name: VALUE,
            deps: &[HEADER],
            evaluate: read_typed_value,
        },
    ];

    fn should_continue(field: &'static str, fields: &FieldSet<ValueField>) -> bool {
        header_is_not_terminal(field, fields)
    }
}

pub(crate) struct StringNamedValue;

impl Layout for StringNamedValue {
    type Value = ValueField;

    const STRUCTURE: &'static str = "PropertyValue(string name)";
    const FIELDS: &'static [FieldDecl<ValueField>] = &[
        FieldDecl {
            name: HEADER,
            deps: &[],
            evaluate: read_string_name_header,
        },
        FieldDecl {
            name: NAME,
            deps: &[HEADER],
            evaluate: read_name,
        },
        // The value follows the name on disk.
        FieldDecl {
            name: VALUE,
            deps: &[HEADER, NAME],
            evaluate: read_typed_value,
        },
    ];

    fn should_continue(field: &'static str, fields: &FieldSet<ValueField>) -> bool {
        header_is_not_terminal(field, fields)
    }
}
