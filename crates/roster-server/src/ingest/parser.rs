//! CSV parsing and header validation
//!
//! Fields are trimmed, blank lines skipped, a leading byte-order mark is
//! ignored and rows may carry fewer or more cells than the header. Headers
//! are matched case-insensitively against the importer's expected set when
//! the first data record is reached; any mismatch stops parsing before a
//! single row is produced.

use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::{HashMap, HashSet};

use super::types::{ErrorCode, IngestionError, ParsedRow};

const BYTE_ORDER_MARK: char = '\u{feff}';

/// Rows read from the input, or the errors that stopped the read
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub rows: Vec<ParsedRow>,
    pub errors: Vec<IngestionError>,
}

impl ParseOutcome {
    fn failed(errors: Vec<IngestionError>) -> Self {
        Self {
            rows: Vec::new(),
            errors,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub fn parse_csv(input: &str, expected_headers: &[&str]) -> ParseOutcome {
    let input = input.strip_prefix(BYTE_ORDER_MARK).unwrap_or(input);

    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let headers: Vec<String> = match reader.headers() {
        Ok(record) => record.iter().map(|h| h.trim().to_lowercase()).collect(),
        Err(e) => return ParseOutcome::failed(vec![parse_error(1, &e)]),
    };

    let mut rows = Vec::new();
    let mut headers_checked = false;

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(e) => return ParseOutcome::failed(vec![parse_error(rows.len() + 1, &e)]),
        };

        if is_blank(&record) {
            continue;
        }

        if !headers_checked {
            let header_errors = check_headers(&headers, expected_headers);
            if !header_errors.is_empty() {
                return ParseOutcome::failed(header_errors);
            }
            headers_checked = true;
        }

        rows.push(ParsedRow {
            row_number: rows.len() + 1,
            fields: to_field_map(&headers, &record),
        });
    }

    tracing::debug!(rows = rows.len(), columns = headers.len(), "Parsed CSV input");

    ParseOutcome {
        rows,
        errors: Vec::new(),
    }
}

/// Compare the actual header set against the expected one
///
/// Missing headers are reported in expected order, then unexpected ones in
/// file order.
pub fn check_headers(actual: &[String], expected: &[&str]) -> Vec<IngestionError> {
    let actual_set: HashSet<&str> = actual.iter().map(String::as_str).collect();
    let expected_lower: Vec<String> = expected.iter().map(|h| h.to_lowercase()).collect();
    let expected_set: HashSet<&str> = expected_lower.iter().map(String::as_str).collect();

    let missing = expected_lower
        .iter()
        .filter(|h| !actual_set.contains(h.as_str()))
        .map(|h| {
            IngestionError::new(
                0,
                h.as_str(),
                ErrorCode::MissingHeader,
                format!("Missing required CSV header: '{}'", h),
            )
        });

    let extra = actual
        .iter()
        .filter(|h| !expected_set.contains(h.as_str()))
        .map(|h| {
            IngestionError::new(
                0,
                h.as_str(),
                ErrorCode::ExtraHeader,
                format!("Unexpected CSV header: '{}'", h),
            )
        });

    missing.chain(extra).collect()
}

fn is_blank(record: &StringRecord) -> bool {
    record.iter().all(str::is_empty)
}

fn to_field_map(headers: &[String], record: &StringRecord) -> HashMap<String, String> {
    headers
        .iter()
        .zip(record.iter())
        .map(|(header, value)| (header.clone(), value.to_string()))
        .collect()
}

fn parse_error(row: usize, err: &csv::Error) -> IngestionError {
    IngestionError::new(
        row,
        "",
        ErrorCode::ParseError,
        format!("CSV parse error: {}", err),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASS_HEADERS: &[&str] = &["class_name", "batch"];

    #[test]
    fn test_parses_rows_in_order() {
        let outcome = parse_csv("class_name,batch\nCSE-A,2024\nCSE-B,2025\n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert_eq!(outcome.rows.len(), 2);
        assert_eq!(outcome.rows[0].row_number, 1);
        assert_eq!(outcome.rows[1].get("class_name"), Some("CSE-B"));
        assert_eq!(outcome.rows[1].get("batch"), Some("2025"));
    }

    #[test]
    fn test_headers_are_case_insensitive_and_trimmed() {
        let outcome = parse_csv(" Class_Name , BATCH \n  CSE-A ,  2024 \n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert_eq!(outcome.rows[0].get("class_name"), Some("CSE-A"));
        assert_eq!(outcome.rows[0].get("batch"), Some("2024"));
    }

    #[test]
    fn test_byte_order_mark_is_ignored() {
        let outcome = parse_csv("\u{feff}class_name,batch\nCSE-A,2024\n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert_eq!(outcome.rows.len(), 1);
    }

    #[test]
    fn test_blank_lines_do_not_consume_row_numbers() {
        let outcome = parse_csv("class_name,batch\n\nCSE-A,2024\n\n , \nCSE-B,2025\n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        let numbers: Vec<usize> = outcome.rows.iter().map(|r| r.row_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(outcome.rows[1].get("class_name"), Some("CSE-B"));
    }

    #[test]
    fn test_ragged_rows_are_tolerated() {
        let outcome = parse_csv("class_name,batch\nCSE-A\nCSE-B,2025,extra\n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert_eq!(outcome.rows[0].get("batch"), None);
        assert_eq!(outcome.rows[1].get("batch"), Some("2025"));
    }

    #[test]
    fn test_quoted_fields_keep_commas() {
        let outcome = parse_csv(
            "subject_code,subject_name\nCS101,\"Data Structures, Part I\"\n",
            &["subject_code", "subject_name"],
        );

        assert!(outcome.is_ok());
        assert_eq!(outcome.rows[0].get("subject_name"), Some("Data Structures, Part I"));
    }

    #[test]
    fn test_extra_header_stops_parsing() {
        let outcome = parse_csv("class_name,batch,region\nCSE-A,2024,North\n", CLASS_HEADERS);

        assert!(outcome.rows.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code, ErrorCode::ExtraHeader);
        assert_eq!(outcome.errors[0].column, "region");
        assert_eq!(outcome.errors[0].row, 0);
        assert_eq!(outcome.errors[0].message, "Unexpected CSV header: 'region'");
    }

    #[test]
    fn test_missing_and_extra_headers_reported_together() {
        let outcome = parse_csv("class_name,year\nCSE-A,2024\n", CLASS_HEADERS);

        let codes: Vec<ErrorCode> = outcome.errors.iter().map(|e| e.code).collect();
        assert_eq!(codes, vec![ErrorCode::MissingHeader, ErrorCode::ExtraHeader]);
        assert_eq!(outcome.errors[0].message, "Missing required CSV header: 'batch'");
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn test_header_only_file_yields_no_rows() {
        let outcome = parse_csv("class_name,batch\n", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert!(outcome.rows.is_empty());
    }

    #[test]
    fn test_empty_input_yields_no_rows() {
        let outcome = parse_csv("", CLASS_HEADERS);

        assert!(outcome.is_ok());
        assert!(outcome.rows.is_empty());
    }
}
