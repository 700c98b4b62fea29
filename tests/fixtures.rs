#![allow(dead_code)]
use std::sync::Once;

use wps::FormatId;

static LOGGER_INIT: Once = Once::new();

// Rust runs the tests concurrently, so unless we synchronize logging access
// it will crash when attempting to run `cargo test` with some logging facilities.
#[cfg(test)]
pub fn ensure_env_logger_initialized() {
    use std::io::Write;

    LOGGER_INIT.call_once(|| {
        let mut builder = env_logger::Builder::from_default_env();
        builder
            .format(|buf, record| writeln!(buf, "[{}] - {}", record.level(), record.args()))
            .init();
    });
}

pub const VT_I4: u32 = 0x0003;
pub const VT_LPWSTR: u32 = 0x001F;
pub const VT_FILETIME: u32 = 0x0040;
pub const VT_STREAM: u32 = 0x0042;
pub const VT_VECTOR: u32 = 0x1000;

pub const STORAGE_VERSION: u32 = 0x5350_5331;

/// `System.Link.*` style storage, integer named.
pub const SHELL_FORMAT_ID: FormatId =
    FormatId::new(0xB725_F130, 0x47EF, 0x101A, 0xA5F1, 0x0260_8C9E_EBAC);

pub const SUMMARY_FORMAT_ID: FormatId =
    FormatId::new(0xF29F_85E0, 0x4FF9, 0x1068, 0xAB91, 0x0800_2B27_B3D9);

pub fn utf16z(s: &str) -> Vec<u8> {
    s.encode_utf16()
        .chain(Some(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// A typed value: tag followed by the payload.
pub fn typed(var_type: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = var_type.to_le_bytes().to_vec();
    out.extend_from_slice(payload);
    out
}

pub fn i4(value: i32) -> Vec<u8> {
    typed(VT_I4, &value.to_le_bytes())
}

pub fn lpwstr(value: &str) -> Vec<u8> {
    let chars = utf16z(value);
    let mut payload = ((chars.len() / 2) as u32).to_le_bytes().to_vec();
    payload.extend(chars);
    while payload.len() % 4 != 0 {
        payload.push(0);
    }
    typed(VT_LPWSTR, &payload)
}

pub fn integer_named(id: u32, typed_value: &[u8]) -> Vec<u8> {
    let size = (9 + typed_value.len()) as u32;
    let mut out = size.to_le_bytes().to_vec();
    out.extend_from_slice(&id.to_le_bytes());
    out.push(0);
    out.extend_from_slice(typed_value);
    out
}

pub fn string_named(name: &str, typed_value: &[u8]) -> Vec<u8> {
    let name = utf16z(name);
    let size = (9 + name.len() + typed_value.len()) as u32;
    let mut out = size.to_le_bytes().to_vec();
    out.extend_from_slice(&(name.len() as u32).to_le_bytes());
    out.push(0);
    out.extend(name);
    out.extend_from_slice(typed_value);
    out
}

/// A storage holding `values`, followed by the terminal value.
pub fn storage(format_id: FormatId, values: &[Vec<u8>]) -> Vec<u8> {
    let body = values.concat();
    let size = (24 + body.len() + 4) as u32;
    let mut out = size.to_le_bytes().to_vec();
    out.extend_from_slice(&STORAGE_VERSION.to_le_bytes());
    out.extend_from_slice(&format_id.to_bytes());
    out.extend(body);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// A store holding `storages`, followed by the terminal storage.
pub fn store(storages: &[Vec<u8>]) -> Vec<u8> {
    let body = storages.concat();
    let size = (4 + body.len() + 4) as u32;
    let mut out = size.to_le_bytes().to_vec();
    out.extend(body);
    out.extend_from_slice(&[0, 0, 0, 0]);
    out
}

/// A small store with one storage of each kind.
pub fn sample_store() -> Vec<u8> {
    store(&[
        storage(
            SHELL_FORMAT_ID,
            &[integer_named(10, &lpwstr("notepad.exe")), integer_named(12, &i4(42))],
        ),
        storage(
            wps::DICTIONARY_FORMAT_ID,
            &[string_named("ab", &i4(7))],
        ),
    ])
}
