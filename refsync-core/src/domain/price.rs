//! Daily price bar.

use crate::decode::{
    check_width, date_value, number_value, optional_date_value, string_value, CsvColumns, Decode,
    DecodeError, FromCsvRecord,
};
use crate::schema::{RawValue, Schema};
use chrono::NaiveDate;
use csv::StringRecord;
use serde::{Deserialize, Serialize};

/// OHLCV bar for a single ticker on a single day.
///
/// Upstream OHLC are split-adjusted; `close_unadjusted` is the raw print and
/// `close_fully_adjusted` also folds in dividends.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Price {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_unadjusted: f64,
    pub close_fully_adjusted: f64,
    pub last_updated: Option<NaiveDate>,
}

impl Price {
    /// Close adjusted for splits only.
    pub fn close_split_adjusted(&self) -> f64 {
        self.close
    }
}

impl Decode for Price {
    fn schema() -> Schema {
        Schema::of(&[
            ("ticker", "String"),
            ("date", "Date"),
            ("open", "double"),
            ("high", "double"),
            ("low", "double"),
            ("close", "double"),
            ("volume", "double"),
            ("closeadj", "double"),
            ("closeunadj", "double"),
            ("lastupdated", "Date"),
        ])
    }

    fn decode(values: &[RawValue], schema: &Schema) -> Result<Self, DecodeError> {
        check_width(values, schema)?;

        let mut p = Price::default();
        for (field, value) in schema.fields().iter().zip(values) {
            let name = field.name.as_str();
            match name {
                "ticker" => p.ticker = string_value(name, value)?,
                "date" => p.date = date_value(name, value)?,
                "open" => p.open = number_value(name, value)?,
                "high" => p.high = number_value(name, value)?,
                "low" => p.low = number_value(name, value)?,
                "close" => p.close = number_value(name, value)?,
                "volume" => p.volume = number_value(name, value)?,
                "closeadj" => p.close_fully_adjusted = number_value(name, value)?,
                "closeunadj" => p.close_unadjusted = number_value(name, value)?,
                "lastupdated" => p.last_updated = optional_date_value(name, value)?,
                _ => {}
            }
        }
        Ok(p)
    }
}

impl FromCsvRecord for Price {
    const COLUMNS: &'static [&'static str] = &[
        "ticker",
        "date",
        "open",
        "high",
        "low",
        "close",
        "volume",
        "closeadj",
        "closeunadj",
        "lastupdated",
    ];

    fn from_csv(record: &StringRecord, columns: &CsvColumns) -> Result<Self, DecodeError> {
        Ok(Price {
            ticker: columns.string(record, "ticker"),
            date: columns.date(record, "date")?,
            open: columns.number(record, "open")?,
            high: columns.number(record, "high")?,
            low: columns.number(record, "low")?,
            close: columns.number(record, "close")?,
            volume: columns.number(record, "volume")?,
            close_unadjusted: columns.number(record, "closeunadj")?,
            close_fully_adjusted: columns.number(record, "closeadj")?,
            last_updated: columns.optional_date(record, "lastupdated")?,
        })
    }

    fn ticker(&self) -> &str {
        &self.ticker
    }
}
