use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

/// Namespace prefix shared by all sample identifiers
pub const BPA_PREFIX: &str = "102.100.100.";

lazy_static! {
    static ref RE_BPA_ID: Regex = Regex::new(r"^102\.100\.100\.\d+$").unwrap();
    static ref RE_NUMERAL: Regex = Regex::new(r"^\d+$").unwrap();
}

/// A validated, normalized sample identifier such as `102.100.100.7032`.
///
/// Can only be constructed through [`SampleId::parse`] or
/// [`SampleId::from_extraction_id`], so every instance is well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SampleId(String);

impl SampleId {
    /// Normalizes and validates a raw identifier.
    ///
    /// Accepts either the full form (`102.100.100.7032`, also with `/` as
    /// separator) or a bare numeral that gets the prefix prepended. On
    /// rejection, a human readable reason is returned.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let cleaned = raw.trim().replace('/', ".");
        if cleaned.is_empty() {
            return Err(String::from("empty identifier"));
        }

        let candidate = if RE_NUMERAL.is_match(&cleaned) {
            format!("{}{}", BPA_PREFIX, cleaned)
        } else {
            cleaned
        };

        if RE_BPA_ID.is_match(&candidate) {
            Ok(SampleId(candidate))
        } else {
            Err(format!("[{}] does not look like {}<number>", raw.trim(), BPA_PREFIX))
        }
    }

    /// Derives the sample from the leading numeral of an extraction id,
    /// e.g. `9486_1` belongs to sample `102.100.100.9486`
    pub fn from_extraction_id(extraction_id: &str) -> Result<Self, String> {
        let numeral = extraction_id.split('_').next().unwrap_or("");
        if !RE_NUMERAL.is_match(numeral) {
            return Err(format!("extraction id [{}] has no leading numeral", extraction_id));
        }
        Self::parse(numeral)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_numeral_gets_prefix() {
        assert_eq!(SampleId::parse("7032").unwrap().as_str(), "102.100.100.7032");
        assert_eq!(SampleId::parse(" 7032 ").unwrap().as_str(), "102.100.100.7032");
    }

    #[test]
    fn slash_notation_is_accepted() {
        assert_eq!(
            SampleId::parse("102.100.100/7032").unwrap(),
            SampleId::parse("102.100.100.7032").unwrap()
        );
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(SampleId::parse("").is_err());
        assert!(SampleId::parse("soil-7032").is_err());
        assert!(SampleId::parse("102.100.101.7032").is_err());
        assert!(SampleId::parse("102.100.100.70a2").is_err());
    }

    #[test]
    fn extraction_id_numeral() {
        let id = SampleId::from_extraction_id("9486_1").unwrap();
        assert_eq!(id.to_string(), "102.100.100.9486");
        assert!(SampleId::from_extraction_id("X9486_1").is_err());
        assert!(SampleId::from_extraction_id("").is_err());
    }
}
