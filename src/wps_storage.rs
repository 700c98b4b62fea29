use crate::err::{DecodeFailure, DeserializationError, DeserializationResult};
use crate::field_engine::{FieldDecl, FieldSet, Layout, LazyStructure};
use crate::record_list::{RecordList, read_record_list};
use crate::utils::{ByteCursor, SubView};
use crate::wps_parser::ParserSettings;
use crate::wps_value::{NameEncoding, PropertyValue};

use log::{debug, trace, warn};
use serde::{Serialize, Serializer};

use std::fmt;

/// `Size` + `Version` + `FormatID`.
pub const STORAGE_HEADER_LEN: usize = 24;

/// "1SPS"
pub const STORAGE_VERSION: u32 = 0x5350_5331;

/// The five groups of a format id, in the order they are written out.
///
/// On disk this is a regular 16 byte GUID, the last two groups are the big endian reading of its
/// trailing byte array.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub struct FormatId {
    pub group1: u32,
    pub group2: u16,
    pub group3: u16,
    pub group4: u16,
    /// Only the low 48 bits are used.
    pub group5: u64,
}

/// Storages with this format id name their properties with strings.
pub const DICTIONARY_FORMAT_ID: FormatId =
    FormatId::new(0xD5CD_D505, 0x2E9C, 0x101B, 0x9397, 0x0800_2B2C_F9AE);

impl FormatId {
    pub const fn new(group1: u32, group2: u16, group3: u16, group4: u16, group5: u64) -> Self {
        FormatId {
            group1,
            group2,
            group3,
            group4,
            group5: group5 & 0xFFFF_FFFF_FFFF,
        }
    }

    fn read(cursor: &mut ByteCursor<'_>) -> DeserializationResult<Self> {
        Ok(FormatId {
            group1: cursor.u32_named("format id")?,
            group2: cursor.u16_named("format id")?,
            group3: cursor.u16_named("format id")?,
            group4: cursor.u16_be_named("format id")?,
            group5: cursor.u48_be_named("format id")?,
        })
    }

    /// The on-disk representation.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0; 16];
        out[0..4].copy_from_slice(&self.group1.to_le_bytes());
        out[4..6].copy_from_slice(&self.group2.to_le_bytes());
        out[6..8].copy_from_slice(&self.group3.to_le_bytes());
        out[8..10].copy_from_slice(&self.group4.to_be_bytes());
        out[10..16].copy_from_slice(&self.group5.to_be_bytes()[2..]);
        out
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
            self.group1, self.group2, self.group3, self.group4, self.group5
        )
    }
}

impl Serialize for FormatId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl NameEncoding {
    pub fn for_format_id(format_id: &FormatId) -> Self {
        if *format_id == DICTIONARY_FORMAT_ID {
            NameEncoding::StringNamed
        } else {
            NameEncoding::IntegerNamed
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StorageHeader {
    /// Size of the whole storage, including this header. Zero marks the end of the list.
    pub size: u32,
    pub version: u32,
    pub format_id: FormatId,
}

impl StorageHeader {
    pub fn is_terminal(&self) -> bool {
        self.size == 0x00
    }

    fn read(cursor: &mut ByteCursor<'_>) -> DeserializationResult<Self> {
        let start = cursor.pos();
        let size = cursor.u32_named("property storage size")?;
        if size == 0 {
            trace!("Offset {}: terminal property storage", cursor.absolute(start));
            return Ok(StorageHeader {
                size,
                version: 0,
                format_id: FormatId::default(),
            });
        }

        if (size as usize) < STORAGE_HEADER_LEN {
            return Err(DeserializationError::NonAdvancingRecord {
                what: "property storage",
                offset: cursor.absolute(start),
                size,
                minimum: STORAGE_HEADER_LEN,
            });
        }
        let have = cursor.buf().len().saturating_sub(start);
        if size as usize > have {
            return Err(DeserializationError::Truncated {
                what: "property storage",
                offset: cursor.absolute(start),
                need: size as usize,
                have,
            });
        }

        let version = cursor.u32_named("property storage version")?;
        if version != STORAGE_VERSION {
            warn!(
                "property storage at offset {} has unexpected version 0x{:08X}",
                cursor.absolute(start),
                version
            );
        }

        Ok(StorageHeader {
            size,
            version,
            format_id: FormatId::read(cursor)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyStorage {
    pub header: StorageHeader,
    pub name_encoding: NameEncoding,
    pub property_values: Vec<PropertyValue>,
    /// Set if the value list ended on corrupt input instead of its terminator.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DecodeFailure>,
}

impl PropertyStorage {
    /// Decode a standalone storage (one that is not wrapped in a store header).
    pub fn from_bytes(bytes: &[u8]) -> DeserializationResult<PropertyStorage> {
        Self::from_bytes_with_settings(bytes, &ParserSettings::default())
    }

    pub fn from_bytes_with_settings(
        bytes: &[u8],
        settings: &ParserSettings,
    ) -> DeserializationResult<PropertyStorage> {
        Self::decode(SubView::new(bytes, 0), settings)
    }

    pub(crate) fn decode(
        view: SubView<'_>,
        settings: &ParserSettings,
    ) -> DeserializationResult<PropertyStorage> {
        let mut parsed = LazyStructure::<StorageLayout>::new(view, settings).parse()?;

        let header = match parsed.fields.take(HEADER) {
            Some(StorageField::Header(header)) => header,
            _ => {
                return Err(DeserializationError::FieldNotEvaluated {
                    structure: StorageLayout::STRUCTURE,
                    field: HEADER,
                });
            }
        };
        let (property_values, failure) = match parsed.fields.take(PROPERTY_VALUE_LIST) {
            Some(StorageField::Values(list)) => (list.records, list.failure),
            _ => (Vec::new(), None),
        };

        Ok(PropertyStorage {
            name_encoding: NameEncoding::for_format_id(&header.format_id),
            header,
            property_values,
            failure,
        })
    }

    pub fn is_terminal(&self) -> bool {
        self.header.is_terminal()
    }

    pub fn format_id(&self) -> &FormatId {
        &self.header.format_id
    }

    /// Looks up an integer named property.
    pub fn property(&self, id: u32) -> Option<&PropertyValue> {
        match self.name_encoding {
            NameEncoding::IntegerNamed => self.property_values.iter().find(|v| v.header.id == id),
            NameEncoding::StringNamed => None,
        }
    }

    /// Looks up a string named property.
    pub fn named_property(&self, name: &str) -> Option<&PropertyValue> {
        self.property_values
            .iter()
            .find(|v| v.name.as_deref() == Some(name))
    }
}

const HEADER: &str = "header";
const PROPERTY_VALUE_LIST: &str = "property_value_list";

pub(crate) enum StorageField {
    Header(StorageHeader),
    Values(RecordList<PropertyValue>),
}

fn read_header(
    cursor: &mut ByteCursor<'_>,
    _fields: &FieldSet<StorageField>,
    _settings: &ParserSettings,
) -> DeserializationResult<StorageField> {
    Ok(StorageField::Header(StorageHeader::read(cursor)?))
}

fn read_property_value_list(
    cursor: &mut ByteCursor<'_>,
    fields: &FieldSet<StorageField>,
    settings: &ParserSettings,
) -> DeserializationResult<StorageField> {
    let header = match fields.require(HEADER)? {
        StorageField::Header(header) => *header,
        StorageField::Values(_) => {
            return Err(DeserializationError::FieldNotEvaluated {
                structure: StorageLayout::STRUCTURE,
                field: HEADER,
            });
        }
    };

    let encoding = NameEncoding::for_format_id(&header.format_id);
    debug!(
        "property storage {} at offset {} uses {:?} values",
        header.format_id,
        cursor.absolute(0),
        encoding
    );

    // Values never extend past the storage, even if more input follows it.
    let size = header.size as usize;
    let mut bounded = cursor.sub_view(0, size, "property storage")?.cursor();
    bounded.set_pos(cursor.pos(), "property storage")?;

    let list = read_record_list(
        &mut bounded,
        size,
        "property value",
        |view| PropertyValue::decode(view, encoding, settings),
        |value| value.header.value_size,
    );
    cursor.set_pos(bounded.pos(), "property storage")?;

    Ok(StorageField::Values(list))
}

pub(crate) struct StorageLayout;

impl Layout for StorageLayout {
    type Value = StorageField;

    const STRUCTURE: &'static str = "PropertyStorage";
    const FIELDS: &'static [FieldDecl<StorageField>] = &[
        FieldDecl {
            name: HEADER,
            deps: &[],
            evaluate: read_header,
        },
        FieldDecl {
            name: PROPERTY_VALUE_LIST,
            deps: &[HEADER],
            evaluate: read_property_value_list,
        },
    ];

    fn should_continue(field: &'static str, fields: &FieldSet<StorageField>) -> bool {
        !(field == HEADER
            && matches!(fields.get(HEADER), Some(StorageField::Header(header)) if header.is_terminal()))
    }
}
