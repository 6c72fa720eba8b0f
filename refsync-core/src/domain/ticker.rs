//! Ticker metadata.

use crate::decode::{
    check_width, integer_value, optional_date_value, string_value, Decode, DecodeError,
};
use crate::schema::{RawValue, Schema};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Size bucket published as `"N - Label"` (e.g. `"4 - Mid"`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MarketCapScale {
    #[default]
    Unknown,
    Nano,
    Micro,
    Small,
    Mid,
    Large,
    Mega,
}

impl MarketCapScale {
    /// Parse the upstream label. Unrecognized or empty labels map to `Unknown`.
    pub fn parse(label: &str) -> Self {
        let code = label.split('-').next().map(str::trim).unwrap_or("");
        match code {
            "1" => Self::Nano,
            "2" => Self::Micro,
            "3" => Self::Small,
            "4" => Self::Mid,
            "5" => Self::Large,
            "6" => Self::Mega,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "",
            Self::Nano => "1 - Nano",
            Self::Micro => "2 - Micro",
            Self::Small => "3 - Small",
            Self::Mid => "4 - Mid",
            Self::Large => "5 - Large",
            Self::Mega => "6 - Mega",
        }
    }
}

/// One row of the tickers table.
///
/// `active` is the authoritative final listing status (`isdelisted = "N"`), used
/// by the reconciler to repair the end of each action series.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ticker {
    pub table: String,
    pub permaticker: i64,
    pub ticker: String,
    pub name: String,
    pub exchange: String,
    pub active: bool,
    pub category: String,
    pub sector: String,
    pub industry: String,
    pub scale_market_cap: MarketCapScale,
    pub scale_revenue: MarketCapScale,
    pub currency: String,
    pub location: String,
    pub first_price_date: Option<NaiveDate>,
    pub last_price_date: Option<NaiveDate>,
    pub last_updated: Option<NaiveDate>,
}

impl Decode for Ticker {
    fn schema() -> Schema {
        Schema::of(&[
            ("table", "String"),
            ("permaticker", "Integer"),
            ("ticker", "String"),
            ("name", "String"),
            ("exchange", "String"),
            ("isdelisted", "String"),
            ("category", "String"),
            ("sector", "String"),
            ("industry", "String"),
            ("scalemarketcap", "String"),
            ("scalerevenue", "String"),
            ("currency", "String"),
            ("location", "String"),
            ("firstpricedate", "Date"),
            ("lastpricedate", "Date"),
            ("lastupdated", "Date"),
        ])
    }

    fn decode(values: &[RawValue], schema: &Schema) -> Result<Self, DecodeError> {
        check_width(values, schema)?;

        let mut t = Ticker {
            active: true,
            ..Default::default()
        };
        for (field, value) in schema.fields().iter().zip(values) {
            let name = field.name.as_str();
            match name {
                "table" => t.table = string_value(name, value)?,
                "permaticker" => t.permaticker = integer_value(name, value)?,
                "ticker" => t.ticker = string_value(name, value)?,
                "name" => t.name = string_value(name, value)?,
                "exchange" => t.exchange = string_value(name, value)?,
                "isdelisted" => t.active = string_value(name, value)? != "Y",
                "category" => t.category = string_value(name, value)?,
                "sector" => t.sector = string_value(name, value)?,
                "industry" => t.industry = string_value(name, value)?,
                "scalemarketcap" => {
                    t.scale_market_cap = MarketCapScale::parse(&string_value(name, value)?)
                }
                "scalerevenue" => {
                    t.scale_revenue = MarketCapScale::parse(&string_value(name, value)?)
                }
                "currency" => t.currency = string_value(name, value)?,
                "location" => t.location = string_value(name, value)?,
                "firstpricedate" => t.first_price_date = optional_date_value(name, value)?,
                "lastpricedate" => t.last_price_date = optional_date_value(name, value)?,
                "lastupdated" => t.last_updated = optional_date_value(name, value)?,
                _ => {}
            }
        }
        Ok(t)
    }
}
