mod byte_cursor;
pub(crate) mod bytes;
mod hexdump;
mod utf16;
mod windows;

pub(crate) use self::byte_cursor::{ByteCursor, SubView};
pub(crate) use self::hexdump::hexdump;
pub(crate) use self::windows::{filetime_to_timestamp, ole_date_to_timestamp};
