//! Relative reference shifting for formula text
//!
//! Shared formulas store their text once, on the master cell. Every other cell
//! in the group evaluates that text moved by its offset from the master, so
//! the text has to be shifted before it can stand alone anywhere else.

use crate::address::{column_letters, to_indices};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const MAX_ROW: i64 = 1_048_576;
const MAX_COL: i64 = 16_384;
const REF_ERROR: &str = "#REF!";

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?P<cell>\$?[A-Z]{1,3}\$?[0-9]+)|(?P<cols>\$?[A-Z]{1,3}:\$?[A-Z]{1,3})|(?P<rows>\$?[0-9]+:\$?[0-9]+)",
        )
        .expect("reference pattern is a valid regex")
    })
}

/// Move every relative reference in `formula` by `rows` and `cols`.
///
/// `$`-anchored parts stay put. String literals, quoted sheet names and
/// structured references are copied untouched. A reference pushed off the
/// sheet becomes `#REF!`.
pub fn shift_formula(formula: &str, rows: i64, cols: i64) -> String {
    if rows == 0 && cols == 0 {
        return formula.to_string();
    }

    let mut out = String::with_capacity(formula.len() + 8);
    let mut code_start = 0;
    let mut chars = formula.char_indices().peekable();

    while let Some((i, ch)) = chars.next() {
        let close = match ch {
            '"' => '"',
            '\'' => '\'',
            '[' => ']',
            _ => continue,
        };
        out.push_str(&shift_code(&formula[code_start..i], rows, cols));

        let mut end = formula.len();
        while let Some((j, c)) = chars.next() {
            if c == close {
                // "" and '' escape the quote itself.
                if close != ']' && chars.peek().map(|&(_, n)| n) == Some(close) {
                    chars.next();
                    continue;
                }
                end = j + c.len_utf8();
                break;
            }
        }
        out.push_str(&formula[i..end]);
        code_start = end;
    }
    out.push_str(&shift_code(&formula[code_start..], rows, cols));
    out
}

fn shift_code(code: &str, rows: i64, cols: i64) -> String {
    let bytes = code.as_bytes();
    reference_pattern()
        .replace_all(code, |caps: &Captures| {
            let Some(m) = caps.get(0) else {
                return String::new();
            };
            let before = m.start().checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(m.end()).copied();
            let name_like = |b: u8| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'$');
            if before.is_some_and(name_like) || after.is_some_and(|b| name_like(b) || b == b'(') {
                return m.as_str().to_string();
            }

            if let Some(cell) = caps.name("cell") {
                shift_cell(cell.as_str(), rows, cols)
            } else if let Some(span) = caps.name("cols") {
                shift_span(span.as_str(), |part| shift_col_ref(part, cols))
            } else {
                shift_span(m.as_str(), |part| shift_row_ref(part, rows))
            }
        })
        .into_owned()
}

fn shift_span(span: &str, shift: impl Fn(&str) -> Option<String>) -> String {
    let Some((a, b)) = span.split_once(':') else {
        return span.to_string();
    };
    match (shift(a), shift(b)) {
        (Some(a), Some(b)) => format!("{}:{}", a, b),
        _ => REF_ERROR.to_string(),
    }
}

fn shift_cell(cell: &str, rows: i64, cols: i64) -> String {
    let Ok((row, col)) = to_indices(cell) else {
        return cell.to_string();
    };
    let col_fixed = cell.starts_with('$');
    let row_fixed = cell[1..].contains('$');

    let col = if col_fixed { col as i64 } else { col as i64 + cols };
    let row = if row_fixed { row as i64 } else { row as i64 + rows };
    if !(1..=MAX_COL).contains(&col) || !(1..=MAX_ROW).contains(&row) {
        return REF_ERROR.to_string();
    }
    format!(
        "{}{}{}{}",
        if col_fixed { "$" } else { "" },
        column_letters(col as u32),
        if row_fixed { "$" } else { "" },
        row
    )
}

fn shift_col_ref(part: &str, cols: i64) -> Option<String> {
    if part.starts_with('$') {
        return Some(part.to_string());
    }
    let (_, col) = to_indices(&format!("{}1", part)).ok()?;
    let col = col as i64 + cols;
    (1..=MAX_COL)
        .contains(&col)
        .then(|| column_letters(col as u32))
}

fn shift_row_ref(part: &str, rows: i64) -> Option<String> {
    if part.starts_with('$') {
        return Some(part.to_string());
    }
    let row = part.parse::<i64>().ok()? + rows;
    (1..=MAX_ROW).contains(&row).then(|| row.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_relative_cells() {
        assert_eq!(shift_formula("B1*2", 1, 0), "B2*2");
        assert_eq!(shift_formula("SUM(A1:B3)+C1", 2, 1), "SUM(B3:C5)+D3");
    }

    #[test]
    fn test_anchored_parts_stay() {
        assert_eq!(shift_formula("$A$1+A$1+$A1", 3, 3), "$A$1+D$1+$A4");
    }

    #[test]
    fn test_literals_and_sheet_names_untouched() {
        assert_eq!(
            shift_formula(r#"IF(A1="B2","x""C3",'Q1 Data'!C3)"#, 1, 0),
            r#"IF(A2="B2","x""C3",'Q1 Data'!C4)"#
        );
        assert_eq!(shift_formula("Sheet1!A1", 1, 0), "Sheet1!A2");
        assert_eq!(shift_formula("Table1[Amount]+A1", 1, 0), "Table1[Amount]+A2");
    }

    #[test]
    fn test_function_names_and_defined_names_untouched() {
        assert_eq!(shift_formula("LOG10(A1)+Rate1", 1, 0), "LOG10(A2)+Rate1");
        assert_eq!(shift_formula("_xlfn.CONCAT(A1)", 0, 1), "_xlfn.CONCAT(B1)");
    }

    #[test]
    fn test_whole_column_and_row_spans() {
        assert_eq!(shift_formula("SUM(A:A)+SUM(2:3)", 1, 1), "SUM(B:B)+SUM(3:4)");
        assert_eq!(shift_formula("SUM($A:A)", 0, 2), "SUM($A:C)");
    }

    #[test]
    fn test_off_sheet_becomes_ref_error() {
        assert_eq!(shift_formula("A1+B2", -1, 0), "#REF!+B1");
    }
}
