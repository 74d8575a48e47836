use derive_more::{Display, Error};
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::parsing::Parsed;
use time::Date;

pub mod subscription;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
#[display("invalid date format: {_0}, expected MM-YYYY or YYYY-MM")]
pub struct InvalidMonth(#[error(ignore)] pub String);

fn parse_with(s: &str, items: &[BorrowedFormatItem<'_>]) -> Option<Date> {
    let mut parsed = Parsed::new();
    let rest = parsed.parse_items(s.as_bytes(), items).ok()?;
    // `[year]` takes an optional sign in front of its four digits
    match (rest.is_empty(), parsed.year(), parsed.month()) {
        (true, Some(year), Some(month)) if year >= 0 && !s.contains('+') => {
            Date::from_calendar_date(year, month, 1).ok()
        }
        _ => None,
    }
}

/// Parses a month-granular date written as `MM-YYYY` or `YYYY-MM`.
/// The day component of the result is always 1.
pub fn parse_month(s: &str) -> Result<Date, InvalidMonth> {
    let s = s.trim();
    parse_with(s, format_description!("[month]-[year]"))
        .or_else(|| parse_with(s, format_description!("[year]-[month]")))
        .ok_or_else(|| InvalidMonth(s.to_string()))
}

pub fn format_month(date: &Date) -> String {
    date.format(format_description!("[month]-[year]"))
        .unwrap_or_else(|_| format!("{:02}-{:04}", u8::from(date.month()), date.year()))
}

/// Drops the day component of a date.
pub fn month_start(date: Date) -> Date {
    date.replace_day(1).unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn parses_both_month_layouts() {
        assert_eq!(parse_month("01-2024"), Ok(date!(2024 - 01 - 01)));
        assert_eq!(parse_month("2024-11"), Ok(date!(2024 - 11 - 01)));
        assert_eq!(parse_month(" 07-2025 "), Ok(date!(2025 - 07 - 01)));
    }

    #[test]
    fn rejects_malformed_months() {
        assert!(parse_month("").is_err());
        assert!(parse_month("13-2024").is_err());
        assert!(parse_month("2024/01").is_err());
        assert!(parse_month("1-2024").is_err());
        assert!(parse_month("ab-2024").is_err());
        assert!(parse_month("01-2024-05").is_err());
    }

    #[test]
    fn rejects_signed_components() {
        assert!(parse_month("+1-2024").is_err());
        assert!(parse_month("01--999").is_err());
        assert!(parse_month("01-+999").is_err());
        assert!(parse_month("01-+2024").is_err());
        assert!(parse_month("01--2024").is_err());
        assert!(parse_month("-2024-01").is_err());
    }

    #[test]
    fn formats_as_month_year() {
        assert_eq!(format_month(&date!(2024 - 03 - 01)), "03-2024");
        assert_eq!(month_start(date!(2024 - 03 - 17)), date!(2024 - 03 - 01));
    }
}
