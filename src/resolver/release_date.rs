//! Release-date precision handling.
//!
//! The catalog reports release dates at year, month, or day precision.
//! Everything is widened to a full date so the column stays uniformly
//! comparable.

use chrono::NaiveDate;

/// Widen a catalog release date to a full date. Year precision becomes
/// January 1st, month precision the 1st of that month. Unparseable input
/// yields None rather than a guess.
pub fn normalize_release_date(raw: &str) -> Option<NaiveDate> {
    match raw.len() {
        4 => raw
            .parse::<i32>()
            .ok()
            .and_then(|year| NaiveDate::from_ymd_opt(year, 1, 1)),
        7 => NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d").ok(),
        _ => NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_precision() {
        assert_eq!(
            normalize_release_date("1972"),
            NaiveDate::from_ymd_opt(1972, 1, 1)
        );
    }

    #[test]
    fn test_month_precision() {
        assert_eq!(
            normalize_release_date("1972-11"),
            NaiveDate::from_ymd_opt(1972, 11, 1)
        );
    }

    #[test]
    fn test_day_precision() {
        assert_eq!(
            normalize_release_date("1972-11-30"),
            NaiveDate::from_ymd_opt(1972, 11, 30)
        );
    }

    #[test]
    fn test_garbage_yields_none() {
        assert_eq!(normalize_release_date(""), None);
        assert_eq!(normalize_release_date("soon"), None);
        assert_eq!(normalize_release_date("1972-13"), None);
        assert_eq!(normalize_release_date("1972-02-30"), None);
    }
}
