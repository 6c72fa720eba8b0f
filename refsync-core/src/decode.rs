//! Row-decoding capability shared by every record type the pipeline materializes.
//!
//! Two entry points exist:
//! - [`Decode`] turns a row of [`RawValue`]s (paginated JSON reads) into a record,
//!   given the schema that produced the row.
//! - [`FromCsvRecord`] turns a CSV row (bulk exports) into a record, given the
//!   column positions resolved from the export header.

use crate::schema::{RawValue, Schema};
use chrono::NaiveDate;
use csv::StringRecord;
use std::collections::HashMap;
use thiserror::Error;

/// Date format used by every upstream table.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Field-level decode failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("row has {actual} values but schema has {expected} fields")]
    FieldCount { expected: usize, actual: usize },

    #[error("field '{field}': expected {expected}, got {value}")]
    FieldType {
        field: String,
        expected: &'static str,
        value: String,
    },

    #[error("field '{field}' is required but empty")]
    MissingValue { field: String },

    #[error("unexpected header: missing column '{column}'")]
    UnexpectedHeader { column: String },
}

/// A record decodable from one row of raw values.
pub trait Decode: Sized {
    /// Columns this record needs. A response schema must be a superset.
    fn schema() -> Schema;

    /// Decode one row. `values` must be positionally aligned with `schema`.
    /// Columns the record does not know are ignored.
    fn decode(values: &[RawValue], schema: &Schema) -> Result<Self, DecodeError>;
}

/// Fail unless the row is as wide as its schema.
pub fn check_width(values: &[RawValue], schema: &Schema) -> Result<(), DecodeError> {
    if values.len() != schema.len() {
        return Err(DecodeError::FieldCount {
            expected: schema.len(),
            actual: values.len(),
        });
    }
    Ok(())
}

fn type_error(field: &str, expected: &'static str, value: &RawValue) -> DecodeError {
    DecodeError::FieldType {
        field: field.to_string(),
        expected,
        value: value.to_string(),
    }
}

/// String cell; null decodes as empty.
pub fn string_value(field: &str, value: &RawValue) -> Result<String, DecodeError> {
    match value {
        RawValue::String(s) => Ok(s.clone()),
        RawValue::Null => Ok(String::new()),
        other => Err(type_error(field, "string", other)),
    }
}

/// Numeric cell; null decodes as zero.
pub fn number_value(field: &str, value: &RawValue) -> Result<f64, DecodeError> {
    match value {
        RawValue::Number(n) => Ok(*n),
        RawValue::Null => Ok(0.0),
        other => Err(type_error(field, "number", other)),
    }
}

/// Largest integer an f64 holds exactly.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Integral cell; null decodes as zero.
pub fn integer_value(field: &str, value: &RawValue) -> Result<i64, DecodeError> {
    match value {
        RawValue::Number(n) if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT_INTEGER => {
            Ok(*n as i64)
        }
        RawValue::Null => Ok(0),
        other => Err(type_error(field, "integer", other)),
    }
}

/// Optional `YYYY-MM-DD` cell.
pub fn optional_date_value(field: &str, value: &RawValue) -> Result<Option<NaiveDate>, DecodeError> {
    match value {
        RawValue::Null => Ok(None),
        RawValue::String(s) if s.is_empty() => Ok(None),
        RawValue::String(s) => NaiveDate::parse_from_str(s, DATE_FORMAT)
            .map(Some)
            .map_err(|_| type_error(field, "date", value)),
        other => Err(type_error(field, "date", other)),
    }
}

/// Required `YYYY-MM-DD` cell.
pub fn date_value(field: &str, value: &RawValue) -> Result<NaiveDate, DecodeError> {
    optional_date_value(field, value)?.ok_or_else(|| DecodeError::MissingValue {
        field: field.to_string(),
    })
}

// ── CSV ─────────────────────────────────────────────────────────────

/// Column name to position map resolved from a CSV header row.
#[derive(Debug, Clone)]
pub struct CsvColumns {
    positions: HashMap<String, usize>,
}

impl CsvColumns {
    /// Map a header row, requiring every column in `required`.
    pub fn from_header(header: &StringRecord, required: &[&str]) -> Result<Self, DecodeError> {
        let positions: HashMap<String, usize> = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_string(), i))
            .collect();

        for column in required {
            if !positions.contains_key(*column) {
                return Err(DecodeError::UnexpectedHeader {
                    column: column.to_string(),
                });
            }
        }

        Ok(Self { positions })
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(column).copied()
    }

    /// Raw text of a column in `record`. Columns absent from the record read as empty.
    pub fn get<'r>(&self, record: &'r StringRecord, column: &str) -> &'r str {
        self.position(column)
            .and_then(|i| record.get(i))
            .unwrap_or("")
    }

    pub fn string(&self, record: &StringRecord, column: &str) -> String {
        self.get(record, column).to_string()
    }

    /// Numeric column; an empty cell decodes as zero.
    pub fn number(&self, record: &StringRecord, column: &str) -> Result<f64, DecodeError> {
        let raw = self.get(record, column).trim();
        if raw.is_empty() {
            return Ok(0.0);
        }
        raw.parse::<f64>().map_err(|_| DecodeError::FieldType {
            field: column.to_string(),
            expected: "number",
            value: raw.to_string(),
        })
    }

    pub fn optional_date(
        &self,
        record: &StringRecord,
        column: &str,
    ) -> Result<Option<NaiveDate>, DecodeError> {
        let raw = self.get(record, column).trim();
        if raw.is_empty() {
            return Ok(None);
        }
        NaiveDate::parse_from_str(raw, DATE_FORMAT)
            .map(Some)
            .map_err(|_| DecodeError::FieldType {
                field: column.to_string(),
                expected: "date",
                value: raw.to_string(),
            })
    }

    pub fn date(&self, record: &StringRecord, column: &str) -> Result<NaiveDate, DecodeError> {
        self.optional_date(record, column)?
            .ok_or_else(|| DecodeError::MissingValue {
                field: column.to_string(),
            })
    }
}

/// A record decodable from one bulk-export CSV row.
pub trait FromCsvRecord: Sized {
    /// Header columns this record needs.
    const COLUMNS: &'static [&'static str];

    fn from_csv(record: &StringRecord, columns: &CsvColumns) -> Result<Self, DecodeError>;

    /// Grouping key of the record.
    fn ticker(&self) -> &str;
}
