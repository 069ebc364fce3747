//! Field-level row validation helpers
//!
//! Importers read each column through a [`RowReader`], which records a
//! coded error for every failed check and returns `None` for that field.
//! The importer assembles its record only when every field came back.

use chrono::NaiveTime;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

use super::types::{ErrorCode, IngestionError};

static EMAIL_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

static TIME_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").ok());

fn pattern_matches(pattern: &LazyLock<Option<Regex>>, value: &str) -> bool {
    pattern.as_ref().is_some_and(|re| re.is_match(value))
}

pub struct RowReader<'a> {
    fields: &'a HashMap<String, String>,
    row: usize,
    errors: Vec<IngestionError>,
}

impl<'a> RowReader<'a> {
    pub fn new(fields: &'a HashMap<String, String>, row: usize) -> Self {
        Self {
            fields,
            row,
            errors: Vec::new(),
        }
    }

    pub fn fail(&mut self, column: &str, code: ErrorCode, message: impl Into<String>) {
        self.errors
            .push(IngestionError::new(self.row, column, code, message));
    }

    pub fn into_errors(self) -> Vec<IngestionError> {
        self.errors
    }

    /// Non-empty trimmed text
    pub fn required(&mut self, column: &str) -> Option<String> {
        match self.fields.get(column).map(|v| v.trim()) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ => {
                self.fail(
                    column,
                    ErrorCode::RequiredField,
                    format!("'{}' is required", column),
                );
                None
            }
        }
    }

    pub fn min_length(&mut self, column: &str, min: usize) -> Option<String> {
        let value = self.required(column)?;
        if value.chars().count() < min {
            self.fail(
                column,
                ErrorCode::InvalidFormat,
                format!("Must be at least {} characters", min),
            );
            return None;
        }
        Some(value)
    }

    /// Email address, lowercased
    pub fn email(&mut self, column: &str) -> Option<String> {
        let value = self.required(column)?;
        if !pattern_matches(&EMAIL_PATTERN, &value) {
            self.fail(column, ErrorCode::InvalidFormat, "Invalid email address");
            return None;
        }
        Some(value.to_lowercase())
    }

    pub fn integer(&mut self, column: &str) -> Option<i32> {
        let value = self.required(column)?;
        match value.parse::<i32>() {
            Ok(number) => Some(number),
            Err(_) => {
                self.fail(column, ErrorCode::InvalidType, "Must be an integer");
                None
            }
        }
    }

    /// Exact match against one of `options`, rendered by `name`
    pub fn one_of<T: Copy>(
        &mut self,
        column: &str,
        options: &[T],
        name: impl Fn(T) -> &'static str,
    ) -> Option<T> {
        let value = self.required(column)?;
        if let Some(found) = options.iter().copied().find(|o| name(*o) == value) {
            return Some(found);
        }

        let allowed: Vec<&str> = options.iter().map(|o| name(*o)).collect();
        self.fail(
            column,
            ErrorCode::InvalidEnum,
            format!("Must be one of: {}", allowed.join(", ")),
        );
        None
    }

    /// 24-hour `HH:mm`
    pub fn time_of_day(&mut self, column: &str) -> Option<NaiveTime> {
        let value = self.required(column)?;
        let parsed = pattern_matches(&TIME_PATTERN, &value)
            .then(|| NaiveTime::parse_from_str(&value, "%H:%M").ok())
            .flatten();

        if parsed.is_none() {
            self.fail(column, ErrorCode::InvalidFormat, "Must be HH:mm format");
        }
        parsed
    }
}
