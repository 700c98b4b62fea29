use crate::err::{DeserializationError, DeserializationResult};
use crate::utils::SubView;
use crate::wps_store::PropertyStore;

use encoding::EncodingRef;
use log::{debug, info};

use std::fmt::{self, Debug};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

pub const DEFAULT_MAX_VECTOR_LEN: usize = 1 << 20;
pub const DEFAULT_MAX_VARIANT_DEPTH: usize = 8;

#[derive(Clone)]
pub struct ParserSettings {
    /// Code page used for `VT_LPSTR` values.
    ansi_codec: EncodingRef,
    /// Upper bound on the element count of a single `VT_VECTOR`.
    max_vector_len: usize,
    /// Upper bound on `VT_VARIANT` nesting inside vectors.
    max_variant_depth: usize,
}

impl Debug for ParserSettings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ParserSettings")
            .field("ansi_codec", &self.ansi_codec.name())
            .field("max_vector_len", &self.max_vector_len)
            .field("max_variant_depth", &self.max_variant_depth)
            .finish()
    }
}

impl PartialEq for ParserSettings {
    fn eq(&self, other: &ParserSettings) -> bool {
        self.ansi_codec.name() == other.ansi_codec.name()
            && self.max_vector_len == other.max_vector_len
            && self.max_variant_depth == other.max_variant_depth
    }
}

impl Default for ParserSettings {
    fn default() -> Self {
        ParserSettings {
            ansi_codec: encoding::all::WINDOWS_1252,
            max_vector_len: DEFAULT_MAX_VECTOR_LEN,
            max_variant_depth: DEFAULT_MAX_VARIANT_DEPTH,
        }
    }
}

impl ParserSettings {
    pub fn new() -> Self {
        ParserSettings::default()
    }

    pub fn ansi_codec(mut self, ansi_codec: EncodingRef) -> Self {
        self.ansi_codec = ansi_codec;

        self
    }

    /// Sets the maximum number of elements a single vector value may declare.
    /// Vectors declaring more are treated as corrupt input.
    pub fn max_vector_len(mut self, max_vector_len: usize) -> Self {
        self.max_vector_len = max_vector_len;

        self
    }

    pub fn max_variant_depth(mut self, max_variant_depth: usize) -> Self {
        self.max_variant_depth = max_variant_depth;

        self
    }

    pub fn get_ansi_codec(&self) -> EncodingRef {
        self.ansi_codec
    }

    pub fn get_max_vector_len(&self) -> usize {
        self.max_vector_len
    }

    pub fn get_max_variant_depth(&self) -> usize {
        self.max_variant_depth
    }
}

/// Decode a serialized property store using the default [`ParserSettings`].
pub fn decode_store(bytes: &[u8]) -> DeserializationResult<PropertyStore> {
    decode_store_with_settings(bytes, &ParserSettings::default())
}

pub fn decode_store_with_settings(
    bytes: &[u8],
    settings: &ParserSettings,
) -> DeserializationResult<PropertyStore> {
    PropertyStore::decode(SubView::new(bytes, 0), settings)
}

/// Owns the bytes of an input containing a serialized property store.
///
/// ```no_run
/// use wps::WpsParser;
///
/// let parser = WpsParser::from_path("property_store.bin").unwrap();
/// let store = parser.parse().unwrap();
/// println!("{}", serde_json::to_string_pretty(&store).unwrap());
/// ```
pub struct WpsParser {
    data: Vec<u8>,
    config: ParserSettings,
}

impl Debug for WpsParser {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WpsParser")
            .field("len", &self.data.len())
            .field("config", &self.config)
            .finish()
    }
}

impl WpsParser {
    pub fn from_path(path: impl AsRef<Path>) -> DeserializationResult<Self> {
        let path = path.as_ref();
        info!("Opening {}", path.display());

        let f = File::open(path)?;
        Self::from_read_seek(BufReader::new(f))
    }

    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        WpsParser {
            data: buffer,
            config: ParserSettings::default(),
        }
    }

    pub fn from_read_seek<T: Read + Seek>(mut read_seek: T) -> DeserializationResult<Self> {
        read_seek.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        read_seek.read_to_end(&mut data)?;
        debug!("Read {} bytes of input", data.len());

        Ok(Self::from_buffer(data))
    }

    pub fn with_configuration(mut self, configuration: ParserSettings) -> Self {
        self.config = configuration;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn parse(&self) -> DeserializationResult<PropertyStore> {
        self.parse_at(0)
    }

    /// Decode a store starting `offset` bytes into the input.
    ///
    /// Offsets reported in errors and failure notes stay relative to the start of the input.
    pub fn parse_at(&self, offset: u64) -> DeserializationResult<PropertyStore> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&start| start <= self.data.len())
            .ok_or(DeserializationError::Truncated {
                what: "property store",
                offset,
                need: 4,
                have: 0,
            })?;

        PropertyStore::decode(SubView::new(&self.data[start..], offset), &self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_settings_builder() {
        let settings = ParserSettings::new()
            .ansi_codec(encoding::all::ISO_8859_1)
            .max_vector_len(16)
            .max_variant_depth(2);

        assert_eq!(settings.get_ansi_codec().name(), "iso-8859-1");
        assert_eq!(settings.get_max_vector_len(), 16);
        assert_eq!(settings.get_max_variant_depth(), 2);
        assert_ne!(settings, ParserSettings::default());
    }

    #[test]
    fn test_parse_at_offset_keeps_absolute_offsets() {
        let mut data = vec![0xAA; 3];
        // Store claims 16 bytes, only 4 are present.
        data.extend_from_slice(&16_u32.to_le_bytes());

        let parser = WpsParser::from_read_seek(Cursor::new(data)).unwrap();
        let err = parser.parse_at(3).unwrap_err();

        assert_eq!(err.kind(), crate::ErrorKind::TruncatedInput);
        assert_eq!(err.offset(), Some(3));
    }

    #[test]
    fn test_parse_at_out_of_range() {
        let parser = WpsParser::from_buffer(vec![4, 0, 0, 0]);
        assert!(parser.parse_at(10).is_err());
        assert_eq!(parser.parse().unwrap().storages.len(), 0);
    }
}
