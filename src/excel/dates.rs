//! Excel serial dates and number-format classification

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Convert an Excel serial date to a timestamp.
///
/// Handles both the 1900 system (with its phantom 1900-02-29) and the 1904
/// system. Returns `None` for negative or non-finite serials.
pub fn serial_to_datetime(serial: f64, date1904: bool) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = if date1904 {
        NaiveDate::from_ymd_opt(1904, 1, 1)?
    } else if serial < 60.0 {
        NaiveDate::from_ymd_opt(1899, 12, 31)?
    } else {
        NaiveDate::from_ymd_opt(1899, 12, 30)?
    };
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let base = epoch.checked_add_signed(Duration::try_days(days)?)?;
    base.and_hms_opt(0, 0, 0)?
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

/// Built-in number format ids that display dates or times.
pub fn is_builtin_date_format(id: u32) -> bool {
    matches!(id, 14..=22 | 27..=36 | 45..=47 | 50..=58)
}

/// Whether a custom format code displays a date or time.
///
/// Quoted literals, escaped characters and bracketed sections (colors,
/// conditions, locales) are ignored before looking for date/time tokens.
pub fn is_date_format_code(code: &str) -> bool {
    let mut cleaned = String::with_capacity(code.len());
    let mut chars = code.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                for c in chars.by_ref() {
                    if c == '"' {
                        break;
                    }
                }
            }
            '\\' | '_' | '*' => {
                chars.next();
            }
            '[' => {
                let mut inner = String::new();
                for c in chars.by_ref() {
                    if c == ']' {
                        break;
                    }
                    inner.push(c);
                }
                // Elapsed-time sections such as [h] or [mm] are time formats.
                let lower = inner.to_ascii_lowercase();
                if !lower.is_empty() && lower.chars().all(|c| matches!(c, 'h' | 'm' | 's')) {
                    cleaned.push('h');
                }
            }
            _ => cleaned.push(ch),
        }
    }
    // Only the first section (positive numbers) decides.
    let first = cleaned.split(';').next().unwrap_or("").to_ascii_lowercase();
    if first == "general" {
        return false;
    }
    first.chars().any(|c| matches!(c, 'y' | 'm' | 'd' | 'h' | 's'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(serial: f64, date1904: bool) -> String {
        serial_to_datetime(serial, date1904)
            .unwrap()
            .format("%Y-%m-%d")
            .to_string()
    }

    #[test]
    fn test_serial_to_datetime_1900_system() {
        assert_eq!(ymd(1.0, false), "1900-01-01");
        assert_eq!(ymd(59.0, false), "1900-02-28");
        assert_eq!(ymd(61.0, false), "1900-03-01");
        assert_eq!(ymd(45306.0, false), "2024-01-15");
    }

    #[test]
    fn test_serial_to_datetime_keeps_time_of_day() {
        let dt = serial_to_datetime(45306.5, false).unwrap();
        assert_eq!(dt.format("%Y-%m-%d %H:%M").to_string(), "2024-01-15 12:00");
    }

    #[test]
    fn test_serial_to_datetime_1904_system() {
        assert_eq!(ymd(0.0, true), "1904-01-01");
        assert_eq!(ymd(43844.0, true), "2024-01-15");
    }

    #[test]
    fn test_serial_rejects_negative() {
        assert!(serial_to_datetime(-1.0, false).is_none());
        assert!(serial_to_datetime(f64::NAN, false).is_none());
    }

    #[test]
    fn test_date_format_codes() {
        assert!(is_date_format_code("yyyy-mm-dd"));
        assert!(is_date_format_code(r"yyyy\-mm\-dd"));
        assert!(is_date_format_code("[$-409]d-mmm-yy;@"));
        assert!(is_date_format_code("[h]:mm:ss"));
        assert!(!is_date_format_code("General"));
        assert!(!is_date_format_code("#,##0.00"));
        assert!(!is_date_format_code("0.00\"days\""));
        assert!(!is_date_format_code("[Red]0.00"));
        assert!(!is_date_format_code("@"));
    }

    #[test]
    fn test_builtin_date_formats() {
        assert!(is_builtin_date_format(14));
        assert!(is_builtin_date_format(22));
        assert!(!is_builtin_date_format(0));
        assert!(!is_builtin_date_format(49));
    }
}
