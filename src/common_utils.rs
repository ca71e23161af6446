use chrono::{Datelike, NaiveDate, Utc};

/// Offset between chrono's day count (from 0001-01-01) and the Unix epoch
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Get current date (UTC)
pub fn get_current_date() -> NaiveDate {
    Utc::now().date_naive()
}

/// Get current timestamp in milliseconds (UTC)
pub fn get_current_timestamp_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Date as days since Unix epoch, the integer form stored in CQL `int` columns
pub fn date_to_days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Order-preserving big-endian encoding of a date (sign bit flipped)
pub fn date_sort_key(date: NaiveDate) -> [u8; 4] {
    ((date_to_days(date) as u32) ^ 0x8000_0000).to_be_bytes()
}

pub fn date_from_sort_key(bytes: [u8; 4]) -> Option<NaiveDate> {
    days_to_date((u32::from_be_bytes(bytes) ^ 0x8000_0000) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_days() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(date_to_days(epoch), 0);
        let d = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
        let before = NaiveDate::from_ymd_opt(1960, 2, 29).unwrap();
        assert!(date_to_days(before) < 0);
    }

    #[test]
    fn test_sort_key_orders_dates() {
        let a = NaiveDate::from_ymd_opt(1960, 1, 1).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let c = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        assert!(date_sort_key(a) < date_sort_key(b));
        assert!(date_sort_key(b) < date_sort_key(c));
        assert_eq!(date_from_sort_key(date_sort_key(c)), Some(c));
    }
}
