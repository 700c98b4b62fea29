use crate::err::{DecodeFailure, DeserializationError, DeserializationResult};
use crate::field_engine::{FieldDecl, FieldSet, Layout, LazyStructure};
use crate::record_list::{RecordList, read_record_list};
use crate::utils::{ByteCursor, SubView};
use crate::wps_parser::ParserSettings;
use crate::wps_storage::{FormatId, PropertyStorage};
use crate::wps_value::PropertyValue;

use log::debug;
use serde::Serialize;

pub const STORE_HEADER_LEN: usize = 4;

/// Size of the empty storage which ends the storage list.
const TERMINAL_STORAGE_LEN: u32 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct StoreHeader {
    /// Size of the whole store, including this header and the terminal storage.
    pub size: u32,
}

impl StoreHeader {
    fn read(cursor: &mut ByteCursor<'_>) -> DeserializationResult<Self> {
        let start = cursor.pos();
        let size = cursor.u32_named("property store size")?;

        if (size as usize) < STORE_HEADER_LEN {
            return Err(DeserializationError::NonAdvancingRecord {
                what: "property store",
                offset: cursor.absolute(start),
                size,
                minimum: STORE_HEADER_LEN,
            });
        }
        let have = cursor.buf().len().saturating_sub(start);
        if size as usize > have {
            return Err(DeserializationError::Truncated {
                what: "property store",
                offset: cursor.absolute(start),
                need: size as usize,
                have,
            });
        }

        Ok(StoreHeader { size })
    }
}

/// A decoded property store.
///
/// Storages decoded before a corrupt one are kept, [`PropertyStore::failure`] tells why the list
/// ended early.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyStore {
    pub header: StoreHeader,
    pub storages: Vec<PropertyStorage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<DecodeFailure>,
}

impl PropertyStore {
    pub(crate) fn decode(
        view: SubView<'_>,
        settings: &ParserSettings,
    ) -> DeserializationResult<PropertyStore> {
        let mut parsed = LazyStructure::<StoreLayout>::new(view, settings).parse()?;

        let header = match parsed.fields.take(HEADER) {
            Some(StoreField::Header(header)) => header,
            _ => {
                return Err(DeserializationError::FieldNotEvaluated {
                    structure: StoreLayout::STRUCTURE,
                    field: HEADER,
                });
            }
        };
        let (storages, failure) = match parsed.fields.take(PROPERTY_STORAGE_LIST) {
            Some(StoreField::Storages(list)) => (list.records, list.failure),
            _ => (Vec::new(), None),
        };

        Ok(PropertyStore {
            header,
            storages,
            failure,
        })
    }

    /// The first storage with the given format id.
    pub fn storage(&self, format_id: &FormatId) -> Option<&PropertyStorage> {
        self.storages.iter().find(|s| s.format_id() == format_id)
    }

    pub fn property(&self, format_id: &FormatId, id: u32) -> Option<&PropertyValue> {
        self.storages
            .iter()
            .filter(|s| s.format_id() == format_id)
            .find_map(|s| s.property(id))
    }

    pub fn named_property(&self, name: &str) -> Option<&PropertyValue> {
        self.storages.iter().find_map(|s| s.named_property(name))
    }

    /// Every value of every storage, in order.
    pub fn property_values(&self) -> impl Iterator<Item = (&PropertyStorage, &PropertyValue)> {
        self.storages
            .iter()
            .flat_map(|s| s.property_values.iter().map(move |v| (s, v)))
    }

    /// Whether this store or any of its storages ended on corrupt input, or any value payload
    /// failed to decode.
    pub fn has_failures(&self) -> bool {
        self.failure.is_some()
            || self.storages.iter().any(|s| s.failure.is_some())
            || self.property_values().any(|(_, v)| v.failure.is_some())
    }
}

const HEADER: &str = "header";
const PROPERTY_STORAGE_LIST: &str = "property_storage_list";

pub(crate) enum StoreField {
    Header(StoreHeader),
    Storages(RecordList<PropertyStorage>),
}

fn read_header(
    cursor: &mut ByteCursor<'_>,
    _fields: &FieldSet<StoreField>,
    _settings: &ParserSettings,
) -> DeserializationResult<StoreField> {
    Ok(StoreField::Header(StoreHeader::read(cursor)?))
}

fn read_property_storage_list(
    cursor: &mut ByteCursor<'_>,
    fields: &FieldSet<StoreField>,
    settings: &ParserSettings,
) -> DeserializationResult<StoreField> {
    let header = match fields.require(HEADER)? {
        StoreField::Header(header) => *header,
        StoreField::Storages(_) => {
            return Err(DeserializationError::FieldNotEvaluated {
                structure: StoreLayout::STRUCTURE,
                field: HEADER,
            });
        }
    };

    let mut bounded = cursor
        .sub_view(0, header.size as usize, "property store")?
        .cursor();
    bounded.set_pos(cursor.pos(), "property store")?;

    // The terminal storage is part of `Size` and is never read as a record.
    let bound = header.size.saturating_sub(TERMINAL_STORAGE_LEN) as usize;
    let list = read_record_list(
        &mut bounded,
        bound,
        "property storage",
        |view| PropertyStorage::decode(view, settings),
        |storage| storage.header.size,
    );
    debug!(
        "property store at offset {}: {} storages",
        cursor.absolute(0),
        list.records.len()
    );
    cursor.set_pos(bounded.pos(), "property store")?;

    Ok(StoreField::Storages(list))
}

pub(crate) struct StoreLayout;

impl Layout for StoreLayout {
    type Value = StoreField;

    const STRUCTURE: &'static str = "PropertyStore";
    const FIELDS: &'static [FieldDecl<StoreField>] = &[
        FieldDecl {
            name: HEADER,
            deps: &[],
            evaluate: read_header,
        },
        FieldDecl {
            name: PROPERTY_STORAGE_LIST,
            deps: &[HEADER],
            evaluate: read_property_storage_list,
        },
    ];
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::typed_value::{TypedValue, VT_I4};
    use crate::wps_storage::{DICTIONARY_FORMAT_ID, STORAGE_HEADER_LEN, STORAGE_VERSION};
    use crate::wps_value::VALUE_HEADER_LEN;

    const FORMAT_ID: FormatId = FormatId::new(0xB725_F130, 0x47EF, 0x101A, 0xA5F1, 0x0260_8C9E_EBAC);

    fn integer_value(id: u32, value: i32) -> Vec<u8> {
        let size = (VALUE_HEADER_LEN + 8) as u32;
        let mut out = size.to_le_bytes().to_vec();
        out.extend_from_slice(&id.to_le_bytes());
        out.push(0);
        out.extend_from_slice(&u32::from(VT_I4).to_le_bytes());
        out.extend_from_slice(&value.to_le_bytes());
        out
    }

    fn storage(format_id: FormatId, values: &[Vec<u8>]) -> Vec<u8> {
        let body = values.concat();
        let size = (STORAGE_HEADER_LEN + body.len() + 4) as u32;
        let mut out = size.to_le_bytes().to_vec();
        out.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
        out.extend_from_slice(&format_id.to_bytes());
        out.extend(body);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn store(storages: &[Vec<u8>]) -> Vec<u8> {
        let body = storages.concat();
        let size = (STORE_HEADER_LEN + body.len() + 4) as u32;
        let mut out = size.to_le_bytes().to_vec();
        out.extend(body);
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    fn decode(bytes: &[u8]) -> DeserializationResult<PropertyStore> {
        PropertyStore::decode(SubView::new(bytes, 0), &ParserSettings::default())
    }

    #[test]
    fn test_empty_store() {
        let store = decode(&[4, 0, 0, 0]).unwrap();
        assert_eq!(store.header.size, 4);
        assert!(store.storages.is_empty());
        assert!(!store.has_failures());
    }

    #[test]
    fn test_storages_in_order() {
        let bytes = store(&[
            storage(FORMAT_ID, &[integer_value(10, 1), integer_value(11, 2)]),
            storage(DICTIONARY_FORMAT_ID, &[]),
        ]);
        let store = decode(&bytes).unwrap();

        assert_eq!(store.storages.len(), 2);
        assert_eq!(store.storages[0].format_id(), &FORMAT_ID);
        assert_eq!(store.storages[1].format_id(), &DICTIONARY_FORMAT_ID);
        assert_eq!(
            store
                .property(&FORMAT_ID, 11)
                .and_then(|v| v.value.as_ref()?.value.clone()),
            Some(TypedValue::I4(2))
        );
        assert_eq!(store.property(&DICTIONARY_FORMAT_ID, 11), None);
        assert_eq!(store.property_values().count(), 2);
    }

    #[test]
    fn test_terminal_storage_ends_list_early() {
        let mut bytes = store(&[storage(FORMAT_ID, &[integer_value(1, 1)])]);
        // Replace the terminator with a zero sized storage followed by garbage inside the bound.
        let len = bytes.len();
        bytes.truncate(len - 4);
        bytes.extend_from_slice(&[0, 0, 0, 0, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0, 0, 0]);
        let size = bytes.len() as u32;
        bytes[..4].copy_from_slice(&size.to_le_bytes());

        let store = decode(&bytes).unwrap();
        assert_eq!(store.storages.len(), 1);
        assert_eq!(store.failure, None);
    }

    #[test]
    fn test_store_size_beyond_input_is_fatal() {
        let err = decode(&[0x40, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TruncatedInput);
        assert_eq!(err.offset(), Some(0));
    }

    #[test]
    fn test_store_size_below_header_is_fatal() {
        let err = decode(&[2, 0, 0, 0]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NonAdvancingRecord);
    }

    #[test]
    fn test_corrupt_storage_keeps_previous_storages() {
        let first = storage(FORMAT_ID, &[integer_value(1, 1)]);
        let first_len = first.len();
        let mut second = storage(FORMAT_ID, &[]);
        second[..4].copy_from_slice(&12_u32.to_le_bytes());
        let store = decode(&store(&[first, second])).unwrap();

        assert_eq!(store.storages.len(), 1);
        let failure = store.failure.clone().unwrap();
        assert_eq!(failure.kind, ErrorKind::NonAdvancingRecord);
        assert_eq!(failure.offset, Some((STORE_HEADER_LEN + first_len) as u64));
        assert!(store.has_failures());
    }
}
