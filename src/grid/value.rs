//! Cell values and style projection

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Plain scalar content of a cell.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Text(String),
    Number(f64),
    Bool(bool),
}

/// Every shape a cell value can take. Rendering to text is total.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Scalar(ScalarValue),
    /// Rich text or a run-structured shared string.
    RichText(Vec<String>),
    DateValue(NaiveDateTime),
    /// Anything else (errors, formulas without a cached result). Rendered as JSON.
    Other(serde_json::Value),
}

impl CellValue {
    pub fn text(s: impl Into<String>) -> Self {
        CellValue::Scalar(ScalarValue::Text(s.into()))
    }

    pub fn number(n: f64) -> Self {
        CellValue::Scalar(ScalarValue::Number(n))
    }

    pub fn render(&self) -> String {
        match self {
            CellValue::Scalar(ScalarValue::Text(s)) => s.clone(),
            CellValue::Scalar(ScalarValue::Number(n)) => format_number(*n),
            CellValue::Scalar(ScalarValue::Bool(b)) => b.to_string(),
            CellValue::RichText(runs) => runs.concat(),
            CellValue::DateValue(dt) => dt.format("%Y-%m-%d").to_string(),
            CellValue::Other(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| "[complex value]".to_string())
            }
        }
    }

    /// Rendered text, or `None` when it would be empty.
    pub fn display(&self) -> Option<String> {
        let text = self.render();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Format a number the way a spreadsheet user expects to read it back:
/// integral values without a fractional part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Visual attributes of a cell relevant to the grid.
///
/// Missing or unreadable attributes are `None`/`false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellStyle {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    pub border: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_render_scalars() {
        assert_eq!(CellValue::text("hello").render(), "hello");
        assert_eq!(CellValue::number(42.0).render(), "42");
        assert_eq!(CellValue::number(-3.5).render(), "-3.5");
        assert_eq!(CellValue::Scalar(ScalarValue::Bool(true)).render(), "true");
    }

    #[test]
    fn test_render_rich_text_concatenates_runs() {
        let value = CellValue::RichText(vec!["Total ".into(), "due".into(), ":".into()]);
        assert_eq!(value.render(), "Total due:");
    }

    #[test]
    fn test_render_date_is_iso_calendar_date() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(13, 45, 0)
            .unwrap();
        assert_eq!(CellValue::DateValue(dt).render(), "2024-03-09");
    }

    #[test]
    fn test_render_other_as_json() {
        let value = CellValue::Other(serde_json::json!({"error": "#DIV/0!"}));
        assert_eq!(value.render(), r##"{"error":"#DIV/0!"}"##);
    }

    #[test]
    fn test_display_empty_is_none() {
        assert_eq!(CellValue::text("").display(), None);
        assert_eq!(CellValue::RichText(vec![]).display(), None);
        assert_eq!(CellValue::text("x").display(), Some("x".to_string()));
    }

    #[test]
    fn test_format_number_large_and_fractional() {
        assert_eq!(format_number(1e20), "100000000000000000000");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::NAN), "NaN");
    }
}
