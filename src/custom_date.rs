use chrono::format::strftime::StrftimeItems;
use chrono::{DateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::time::{Duration, SystemTime};

/// `Tue, 30 Apr 2024 14:05:09 BST` style time for the page.
pub fn format_rfc1123(datetime: DateTime<Utc>, tz: Tz) -> String {
    let format = StrftimeItems::new("%a, %d %b %Y %H:%M:%S %Z");
    tz.from_utc_datetime(&datetime.naive_utc())
        .format_with_items(format)
        .to_string()
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Whole-second `SystemTime` for HTTP date headers.
pub fn to_system_time(datetime: DateTime<Utc>) -> SystemTime {
    let secs = datetime.timestamp().max(0) as u64;
    SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_in_requested_zone() {
        let at = Utc.with_ymd_and_hms(2024, 4, 30, 13, 5, 9).unwrap();
        assert_eq!(format_rfc1123(at, Tz::UTC), "Tue, 30 Apr 2024 13:05:09 UTC");
        assert_eq!(
            format_rfc1123(at, Tz::Europe__London),
            "Tue, 30 Apr 2024 14:05:09 BST"
        );
    }

    #[test]
    fn parses_iana_names() {
        assert_eq!(parse_timezone("Europe/Moscow"), Some(Tz::Europe__Moscow));
        assert_eq!(parse_timezone(" UTC "), Some(Tz::UTC));
        assert_eq!(parse_timezone("Mars/Olympus"), None);
    }

    #[test]
    fn system_time_drops_subseconds() {
        let at = Utc.with_ymd_and_hms(2024, 4, 30, 13, 5, 9).unwrap()
            + chrono::Duration::milliseconds(750);
        let expected = SystemTime::UNIX_EPOCH + Duration::from_secs(1_714_482_309);
        assert_eq!(to_system_time(at), expected);
    }
}
