use jiff::Timestamp;

use crate::err::{DeserializationError, DeserializationResult};

const WINDOWS_TO_UNIX_SECS: i64 = 11_644_473_600;
/// Days between the OLE automation epoch (1899-12-30) and the unix epoch.
const OLE_TO_UNIX_DAYS: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[inline]
pub(crate) fn filetime_to_timestamp(filetime: u64, offset: u64) -> DeserializationResult<Timestamp> {
    let secs = (filetime / 10_000_000) as i64 - WINDOWS_TO_UNIX_SECS;
    let nanos = ((filetime % 10_000_000) * 100) as i32;
    Timestamp::new(secs, nanos).map_err(|_| DeserializationError::InvalidDateTime {
        what: "filetime",
        offset,
    })
}

/// Convert an OLE automation date (`VT_DATE`, fractional days since 1899-12-30) to a timestamp.
pub(crate) fn ole_date_to_timestamp(days: f64, offset: u64) -> DeserializationResult<Timestamp> {
    let invalid = || DeserializationError::InvalidDateTime {
        what: "ole date",
        offset,
    };
    if !days.is_finite() {
        return Err(invalid());
    }
    let millis = ((days - OLE_TO_UNIX_DAYS) * MILLIS_PER_DAY).round();
    if millis.abs() > i64::MAX as f64 {
        return Err(invalid());
    }
    Timestamp::from_millisecond(millis as i64).map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filetime_epoch() {
        let ts = filetime_to_timestamp(116_444_736_000_000_000, 0).unwrap();
        assert_eq!(ts, Timestamp::UNIX_EPOCH);
    }

    #[test]
    fn test_ole_date() {
        let ts = ole_date_to_timestamp(25_569.5, 0).unwrap();
        assert_eq!(ts.as_second(), 43_200);
        assert!(ole_date_to_timestamp(f64::NAN, 12).is_err());
    }
}
