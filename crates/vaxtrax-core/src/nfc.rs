//! # NFC Payload Parser
//!
//! Extracts a temperature reading from the text record a scanner tag
//! delivers. Records are delimited by `,` `;` `|`, tab or newline:
//!
//! ```text
//! VAX-2025-004;-18.7°C;NFC Scanner #14
//! ```
//!
//! The first field that parses as a finite number (optionally suffixed with
//! `°C` or `C`) is the reading. When no such field exists the operator must
//! enter the temperature by hand.

use crate::VaxtraxError;
use crate::primitives::MAX_NFC_PAYLOAD_LENGTH;

const DELIMITERS: [char; 5] = [',', ';', '|', '\t', '\n'];

const MANUAL_ENTRY: &str = "manual temperature entry required";

/// Result of parsing a tag payload.
#[derive(Debug, Clone, PartialEq)]
pub struct NfcReading {
    /// Reading in °C.
    pub temperature: f64,
    /// All non-empty trimmed fields in order, including the reading.
    pub fields: Vec<String>,
}

/// Parse a raw tag payload.
pub fn parse_payload(payload: &str) -> Result<NfcReading, VaxtraxError> {
    if payload.len() > MAX_NFC_PAYLOAD_LENGTH {
        return Err(VaxtraxError::Validation(format!(
            "{MANUAL_ENTRY}: payload length {} exceeds maximum {} bytes",
            payload.len(),
            MAX_NFC_PAYLOAD_LENGTH
        )));
    }

    let fields: Vec<String> = payload
        .split(DELIMITERS)
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect();

    if fields.is_empty() {
        return Err(VaxtraxError::Validation(format!(
            "{MANUAL_ENTRY}: empty payload"
        )));
    }

    let temperature = fields
        .iter()
        .find_map(|f| parse_reading(f))
        .ok_or_else(|| {
            VaxtraxError::Validation(format!("{MANUAL_ENTRY}: no temperature field in payload"))
        })?;

    Ok(NfcReading {
        temperature,
        fields,
    })
}

fn parse_reading(field: &str) -> Option<f64> {
    let number = field
        .strip_suffix("°C")
        .or_else(|| field.strip_suffix('C'))
        .unwrap_or(field)
        .trim_end();
    number.parse::<f64>().ok().filter(|t| t.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_numeric_field_wins() {
        let reading = parse_payload("VAX-2025-004;-18.7°C;-3.0").expect("parse");
        assert_eq!(reading.temperature, -18.7);
        assert_eq!(reading.fields.len(), 3);
    }

    #[test]
    fn accepts_each_delimiter() {
        for payload in [
            "id,-16.5",
            "id;-16.5",
            "id|-16.5",
            "id\t-16.5",
            "id\n-16.5",
        ] {
            assert_eq!(parse_payload(payload).expect("parse").temperature, -16.5);
        }
    }

    #[test]
    fn unit_suffix_and_whitespace() {
        assert_eq!(parse_payload("  -20 C ").expect("parse").temperature, -20.0);
        assert_eq!(parse_payload("-20°C").expect("parse").temperature, -20.0);
        assert_eq!(parse_payload("-20 °C").expect("parse").temperature, -20.0);
    }

    #[test]
    fn non_finite_fields_are_skipped() {
        let reading = parse_payload("NaN|inf|-17.2").expect("parse");
        assert_eq!(reading.temperature, -17.2);
    }

    #[test]
    fn missing_reading_requires_manual_entry() {
        for payload in ["", " ;; ", "VAX-2025-004;Scanner", "NaN"] {
            let err = parse_payload(payload).expect_err("no reading");
            assert!(matches!(err, VaxtraxError::Validation(ref m) if m.contains(MANUAL_ENTRY)));
        }
    }

    #[test]
    fn oversized_payload_rejected() {
        let payload = "1,".repeat(MAX_NFC_PAYLOAD_LENGTH);
        assert!(parse_payload(&payload).is_err());
    }
}
