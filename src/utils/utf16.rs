use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum Utf16LeDecodeError {
    OddLength,
    InvalidData,
}

/// Decode a UTF-16LE byte slice until the first NUL (0x0000), if present.
///
/// Property names and `VT_LPWSTR` payloads are NUL terminated on disk, but the declared sizes
/// frequently include trailing garbage after the terminator.
pub(crate) fn decode_utf16le_bytes_z(bytes: &[u8]) -> Result<String, Utf16LeDecodeError> {
    if !bytes.len().is_multiple_of(2) {
        return Err(Utf16LeDecodeError::OddLength);
    }

    let mut units = vec![0_u16; bytes.len() / 2];
    LittleEndian::read_u16_into(bytes, &mut units);

    let end = units.iter().position(|&c| c == 0).unwrap_or(units.len());
    let slice = &units[..end];

    // Pure ASCII converts directly without surrogate handling.
    if slice.iter().all(|&c| c <= 0x7F) {
        return Ok(slice.iter().map(|&c| c as u8 as char).collect());
    }

    String::from_utf16(slice).map_err(|_| Utf16LeDecodeError::InvalidData)
}
