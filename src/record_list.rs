use crate::err::{DecodeFailure, DeserializationError, DeserializationResult};
use crate::utils::{ByteCursor, SubView, hexdump};

use log::{debug, trace, warn};

/// Every record starts with its own `u32` size.
const MIN_RECORD_SIZE: usize = 4;

/// A list of self delimited records, and what stopped it if it ended early.
#[derive(Debug)]
pub(crate) struct RecordList<T> {
    pub(crate) records: Vec<T>,
    pub(crate) failure: Option<DecodeFailure>,
}

/// Read consecutive records, each starting with its own `u32` size.
///
/// Every record is decoded by `decode` from a fresh view beginning at its first byte (bounded by
/// its declared size), the cursor then moves to `start + size`. Reading stops while the cursor is
/// `bound` or past it, at the first record of size zero (which is not kept), or at the first
/// error. An error does not discard the records read before it, it is recorded as the list's
/// failure.
pub(crate) fn read_record_list<'a, T>(
    cursor: &mut ByteCursor<'a>,
    bound: usize,
    what: &'static str,
    mut decode: impl FnMut(SubView<'a>) -> DeserializationResult<T>,
    record_size: impl Fn(&T) -> u32,
) -> RecordList<T> {
    let mut records = Vec::new();
    let mut failure = None;

    while cursor.pos() < bound {
        let original_position = cursor.pos();
        trace!(
            "Offset `0x{offset:08x} ({offset})`: {what} #{index}",
            offset = cursor.absolute(original_position),
            what = what,
            index = records.len()
        );

        let result = read_one(cursor, original_position, what, &mut decode, &record_size)
            .and_then(|record| match record {
                Some((record, size)) => {
                    advance(cursor, original_position, size, what).map(|_| Some(record))
                }
                None => Ok(None),
            });

        match result {
            Ok(Some(record)) => records.push(record),
            Ok(None) => {
                debug!(
                    "terminal {} at offset {}, {} records",
                    what,
                    cursor.absolute(original_position),
                    records.len()
                );
                break;
            }
            Err(e) => {
                warn!(
                    "{} list ended early after {} records: {}",
                    what,
                    records.len(),
                    e
                );
                debug!(
                    "{}",
                    hexdump(
                        cursor.buf().get(original_position..).unwrap_or_default(),
                        cursor.absolute(original_position),
                        64
                    )
                );
                failure = Some(DecodeFailure::from(&e));
                break;
            }
        }
    }

    RecordList { records, failure }
}

fn read_one<'a, T>(
    cursor: &ByteCursor<'a>,
    original_position: usize,
    what: &'static str,
    decode: &mut impl FnMut(SubView<'a>) -> DeserializationResult<T>,
    record_size: &impl Fn(&T) -> u32,
) -> DeserializationResult<Option<(T, usize)>> {
    let mut peek = *cursor;
    let declared = peek.u32_named(what)?;
    if declared != 0 && (declared as usize) < MIN_RECORD_SIZE {
        return Err(DeserializationError::NonAdvancingRecord {
            what,
            offset: cursor.absolute(original_position),
            size: declared,
            minimum: MIN_RECORD_SIZE,
        });
    }

    // Declared sizes are checked against the input before a nested decoder sees them.
    let view = if declared == 0 {
        cursor.tail_view(original_position, what)?
    } else {
        cursor.sub_view(original_position, declared as usize, what)?
    };

    let record = decode(view)?;
    match record_size(&record) as usize {
        0 => Ok(None),
        size => Ok(Some((record, size))),
    }
}

fn advance(
    cursor: &mut ByteCursor<'_>,
    original_position: usize,
    size: usize,
    what: &'static str,
) -> DeserializationResult<()> {
    let next = original_position.saturating_add(size);
    // Record decoders reject sizes smaller than their headers, but a loop over corrupt input
    // must never depend on that.
    if next <= original_position || size < MIN_RECORD_SIZE {
        return Err(DeserializationError::NonAdvancingRecord {
            what,
            offset: cursor.absolute(original_position),
            size: size as u32,
            minimum: MIN_RECORD_SIZE,
        });
    }
    cursor.set_pos(next, what)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    /// A record is its `u32` size followed by opaque bytes.
    fn decode_raw(view: SubView<'_>) -> DeserializationResult<(u32, Vec<u8>)> {
        let mut cursor = view.cursor();
        let size = cursor.u32_named("size")?;
        Ok((size, cursor.remaining().to_vec()))
    }

    fn read(data: &[u8], bound: usize) -> RecordList<(u32, Vec<u8>)> {
        let mut cursor = ByteCursor::new(data);
        read_record_list(&mut cursor, bound, "record", decode_raw, |r| r.0)
    }

    #[test]
    fn test_stops_at_terminal_record() {
        let data = [5, 0, 0, 0, 0xAA, 6, 0, 0, 0, 0xBB, 0xCC, 0, 0, 0, 0, 7, 0, 0, 0];
        let list = read(&data, data.len());

        assert_eq!(
            list.records,
            vec![(5, vec![0xAA]), (6, vec![0xBB, 0xCC])]
        );
        assert_eq!(list.failure, None);
    }

    #[test]
    fn test_stops_at_bound() {
        let data = [5, 0, 0, 0, 0xAA, 5, 0, 0, 0, 0xBB];
        let list = read(&data, 5);
        assert_eq!(list.records.len(), 1);
        assert_eq!(list.failure, None);
    }

    #[test]
    fn test_oversized_record_keeps_previous_records() {
        let data = [5, 0, 0, 0, 0xAA, 0xFF, 0, 0, 0, 0xBB];
        let list = read(&data, data.len());

        assert_eq!(list.records, vec![(5, vec![0xAA])]);
        let failure = list.failure.unwrap();
        assert_eq!(failure.kind, ErrorKind::TruncatedInput);
        assert_eq!(failure.offset, Some(5));
    }

    #[test]
    fn test_non_advancing_record_is_rejected() {
        let data = [2, 0, 0, 0, 0, 0, 0, 0];
        let list = read(&data, data.len());

        assert!(list.records.is_empty());
        assert_eq!(list.failure.unwrap().kind, ErrorKind::NonAdvancingRecord);
    }
}
