//! Small cleaning functions correcting known data-quality defects of the
//! metadata spreadsheets. All of them are pure apart from logging.

use crate::samplesheet::{Cell, Value};

/// Dilution recorded for sheets whose dilution column got typed as time
pub const DILUTION_SENTINEL: &str = "1:10";

/// Maximum barcode length of the sequencing hardware
pub const INDEX_LENGTH: usize = 12;

/// Some source files ship the dilution column formatted as a time, so the
/// cell comes back numeric. These all were 1:10 dilutions.
pub fn fix_dilution(cell: &Cell) -> Result<Value, String> {
    let value = match cell {
        Cell::Number(_) => DILUTION_SENTINEL.to_string(),
        Cell::Text(s) => s.to_uppercase(),
        Cell::Empty => String::new(),
    };
    Ok(Value::Text(value))
}

/// PCR outcome codes are `P`, `F` or blank, anything else becomes `X`
pub fn fix_pcr(cell: &Cell) -> Result<Value, String> {
    let val = cell.text();
    match val.as_str() {
        "P" | "F" | "" => Ok(Value::Text(val)),
        _ => {
            error!("PCR value [{}] is neither F, P or \"\", setting to X", val);
            Ok(Value::Text(String::from("X")))
        }
    }
}

/// Unify the two historical identifier notations (`102.100.100/7032` and `102.100.100.7032`)
pub fn clean_identifier(cell: &Cell) -> Result<Value, String> {
    Ok(Value::from_text(cell.text().replace('/', ".")))
}

pub fn upper_trim(cell: &Cell) -> Result<Value, String> {
    Ok(Value::from_text(cell.text().to_uppercase()))
}

pub fn truncate_index(cell: &Cell) -> Result<Value, String> {
    Ok(Value::from_text(cell.text().chars().take(INDEX_LENGTH).collect()))
}

/// Read counts must be integers. Blank cells are allowed, anything else
/// that doesn't parse is handed back as error.
pub fn parse_int(cell: &Cell) -> Result<Value, String> {
    match cell {
        Cell::Empty => Ok(Value::Blank),
        Cell::Number(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            Ok(Value::Int(*f as i64))
        }
        Cell::Number(f) => Err(f.to_string()),
        Cell::Text(_) => {
            let s = cell.text();
            if s.is_empty() {
                return Ok(Value::Blank);
            }
            s.parse::<i64>().map(Value::Int).map_err(|_| s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    #[test]
    fn numeric_dilution_becomes_sentinel() {
        for f in &[0.0, 0.041_666, 1.0, 43_831.5, -2.0] {
            assert_eq!(fix_dilution(&Cell::Number(*f)), Ok(Value::Text(String::from("1:10"))));
        }
    }

    #[test]
    fn textual_dilution_is_uppercased() {
        for s in &["1:10", "1:100", "neat", "Neat ", ""] {
            assert_eq!(fix_dilution(&text(s)), Ok(Value::Text(s.to_uppercase())));
        }
    }

    #[test]
    fn pcr_codes() {
        assert_eq!(fix_pcr(&text(" P ")), Ok(Value::Text(String::from("P"))));
        assert_eq!(fix_pcr(&text("F")), Ok(Value::Text(String::from("F"))));
        assert_eq!(fix_pcr(&Cell::Empty), Ok(Value::Text(String::new())));
        for bad in &["p", "pass", "FF", "?", "P/F"] {
            assert_eq!(fix_pcr(&text(bad)), Ok(Value::Text(String::from("X"))), "{}", bad);
        }
        assert_eq!(fix_pcr(&Cell::Number(1.0)), Ok(Value::Text(String::from("X"))));
    }

    #[test]
    fn identifier_separator() {
        assert_eq!(
            clean_identifier(&text("102.100.100/7032")),
            Ok(Value::Text(String::from("102.100.100.7032")))
        );
    }

    #[test]
    fn index_is_truncated() {
        assert_eq!(
            truncate_index(&text("ACGTGTACCCAATTT")),
            Ok(Value::Text(String::from("ACGTGTACCCAA")))
        );
        assert_eq!(truncate_index(&text("ACGT")), Ok(Value::Text(String::from("ACGT"))));
        assert_eq!(truncate_index(&Cell::Empty), Ok(Value::Blank));
    }

    #[test]
    fn read_counts() {
        assert_eq!(parse_int(&Cell::Number(123_456.0)), Ok(Value::Int(123_456)));
        assert_eq!(parse_int(&text(" 42 ")), Ok(Value::Int(42)));
        assert_eq!(parse_int(&Cell::Empty), Ok(Value::Blank));
        assert_eq!(parse_int(&text("lots")), Err(String::from("lots")));
        assert!(parse_int(&Cell::Number(1.5)).is_err());
    }
}
