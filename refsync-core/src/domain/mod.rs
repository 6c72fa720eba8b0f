//! Domain records decoded from the upstream tables.

pub mod action;
pub mod price;
pub mod ticker;

pub use action::{ActionKind, ActionRecord, RawAction};
pub use price::Price;
pub use ticker::{MarketCapScale, Ticker};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price table a bulk export is requested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTable {
    /// Equity prices (`SEP`).
    Equities,
    /// Fund prices (`SFP`).
    Funds,
}

impl PriceTable {
    /// Tables fetched when none are requested.
    pub const DEFAULT: [PriceTable; 2] = [PriceTable::Equities, PriceTable::Funds];

    /// Upstream table code.
    pub fn code(&self) -> &'static str {
        match self {
            PriceTable::Equities => "SEP",
            PriceTable::Funds => "SFP",
        }
    }

    /// Requested tables, or the default set if none.
    pub fn or_default(tables: &[PriceTable]) -> Vec<PriceTable> {
        if tables.is_empty() {
            Self::DEFAULT.to_vec()
        } else {
            tables.to_vec()
        }
    }
}

impl fmt::Display for PriceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for PriceTable {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "equities" | "sep" => Ok(PriceTable::Equities),
            "funds" | "sfp" => Ok(PriceTable::Funds),
            other => Err(format!("unknown price table '{other}' (expected equities or funds)")),
        }
    }
}
