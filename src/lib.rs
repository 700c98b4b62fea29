#![deny(unused_must_use)]
#![forbid(unsafe_code)]
// Don't allow dbg! prints in release.
#![cfg_attr(not(debug_assertions), deny(clippy::dbg_macro))]
//! A forensically tolerant decoder for serialized Windows Property Stores.
//!
//! A store is a list of storages, each a list of typed property values named either by
//! integer ids or (for the dictionary format id) by UTF-16 strings. Corrupt input inside a list
//! ends that list early and is recorded next to what was decoded before it.
//!
//! ```
//! let store = wps::decode_store(&[4, 0, 0, 0]).unwrap();
//! assert!(store.storages.is_empty());
//! ```

pub use err::{DecodeFailure, DeserializationError, DeserializationResult, ErrorKind};
pub use typed_value::{TypedPropertyValue, TypedValue, decode_typed_value, var_type_name};
pub use wps_parser::{ParserSettings, WpsParser, decode_store, decode_store_with_settings};
pub use wps_storage::{DICTIONARY_FORMAT_ID, FormatId, PropertyStorage, StorageHeader};
pub use wps_store::{PropertyStore, StoreHeader};
pub use wps_value::{NameEncoding, PropertyValue, ValueHeader};

pub mod err;
pub mod typed_value;
pub mod wps_parser;
pub mod wps_storage;
pub mod wps_store;
pub mod wps_value;

mod field_engine;
mod record_list;
mod utils;
