//! Corporate actions: raw events as published, and reconciled adjustment records.

use crate::decode::{check_width, date_value, number_value, string_value, Decode, DecodeError};
use crate::schema::{RawValue, Schema};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Kind of a raw corporate action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionKind {
    AcquisitionBy,
    AcquisitionOf,
    BankruptcyLiquidation,
    Delisted,
    Dividend,
    Initiated,
    Listed,
    MergerFrom,
    MergerTo,
    RegulatoryDelisting,
    Relation,
    Spinoff,
    SpinoffDividend,
    Split,
    SpunOffFrom,
    TickerChangeFrom,
    TickerChangeTo,
    VoluntaryDelisting,
    #[default]
    Unknown,
}

impl ActionKind {
    /// Kinds that affect reconciliation.
    pub const RELEVANT: [ActionKind; 9] = [
        ActionKind::AcquisitionBy,
        ActionKind::Delisted,
        ActionKind::Dividend,
        ActionKind::Listed,
        ActionKind::MergerFrom,
        ActionKind::RegulatoryDelisting,
        ActionKind::SpinoffDividend,
        ActionKind::Split,
        ActionKind::VoluntaryDelisting,
    ];

    /// Parse an upstream action code. Unrecognized codes map to `Unknown`.
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "acquisitionby" => Self::AcquisitionBy,
            "acquisitionof" => Self::AcquisitionOf,
            "bankruptcyliquidation" => Self::BankruptcyLiquidation,
            "delisted" => Self::Delisted,
            "dividend" => Self::Dividend,
            "initiated" => Self::Initiated,
            "listed" => Self::Listed,
            "mergerfrom" => Self::MergerFrom,
            "mergerto" => Self::MergerTo,
            "regulatorydelisting" => Self::RegulatoryDelisting,
            "relation" => Self::Relation,
            "spinoff" => Self::Spinoff,
            "spinoffdividend" => Self::SpinoffDividend,
            "split" => Self::Split,
            "spunofffrom" => Self::SpunOffFrom,
            "tickerchangefrom" => Self::TickerChangeFrom,
            "tickerchangeto" => Self::TickerChangeTo,
            "voluntarydelisting" => Self::VoluntaryDelisting,
            _ => Self::Unknown,
        }
    }

    /// Upstream code, as used in query filters.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AcquisitionBy => "acquisitionby",
            Self::AcquisitionOf => "acquisitionof",
            Self::BankruptcyLiquidation => "bankruptcyliquidation",
            Self::Delisted => "delisted",
            Self::Dividend => "dividend",
            Self::Initiated => "initiated",
            Self::Listed => "listed",
            Self::MergerFrom => "mergerfrom",
            Self::MergerTo => "mergerto",
            Self::RegulatoryDelisting => "regulatorydelisting",
            Self::Relation => "relation",
            Self::Spinoff => "spinoff",
            Self::SpinoffDividend => "spinoffdividend",
            Self::Split => "split",
            Self::SpunOffFrom => "spunofffrom",
            Self::TickerChangeFrom => "tickerchangefrom",
            Self::TickerChangeTo => "tickerchangeto",
            Self::VoluntaryDelisting => "voluntarydelisting",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_relevant(&self) -> bool {
        Self::RELEVANT.contains(self)
    }

    /// True for events that end a listing.
    pub fn is_delisting(&self) -> bool {
        matches!(
            self,
            Self::AcquisitionBy
                | Self::MergerFrom
                | Self::RegulatoryDelisting
                | Self::VoluntaryDelisting
                | Self::Delisted
        )
    }

    pub fn is_dividend(&self) -> bool {
        matches!(self, Self::Dividend | Self::SpinoffDividend)
    }
}

/// One row of the actions table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAction {
    pub date: NaiveDate,
    pub action: ActionKind,
    pub ticker: String,
    pub name: String,
    pub value: f64,
    pub contra_ticker: String,
    pub contra_name: String,
}

impl Decode for RawAction {
    fn schema() -> Schema {
        Schema::of(&[
            ("date", "Date"),
            ("action", "String"),
            ("ticker", "String"),
            ("name", "String"),
            ("value", "BigDecimal(20,5)"),
            ("contraticker", "String"),
            ("contraname", "String"),
        ])
    }

    fn decode(values: &[RawValue], schema: &Schema) -> Result<Self, DecodeError> {
        check_width(values, schema)?;

        let mut a = RawAction::default();
        for (field, value) in schema.fields().iter().zip(values) {
            let name = field.name.as_str();
            match name {
                "date" => a.date = date_value(name, value)?,
                "action" => a.action = ActionKind::parse(&string_value(name, value)?),
                "ticker" => a.ticker = string_value(name, value)?,
                "name" => a.name = string_value(name, value)?,
                "value" => a.value = number_value(name, value)?,
                "contraticker" => a.contra_ticker = string_value(name, value)?,
                "contraname" => a.contra_name = string_value(name, value)?,
                _ => {}
            }
        }
        Ok(a)
    }
}

/// Reconciled adjustment record: the compounded effect of every raw action
/// since the previous record, dated at a price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub date: NaiveDate,
    pub dividend_factor: f64,
    pub split_factor: f64,
    pub active: bool,
}

impl ActionRecord {
    /// Record with neutral factors.
    pub fn neutral(date: NaiveDate, active: bool) -> Self {
        Self {
            date,
            dividend_factor: 1.0,
            split_factor: 1.0,
            active,
        }
    }

    pub fn is_neutral(&self) -> bool {
        self.dividend_factor == 1.0 && self.split_factor == 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        for kind in ActionKind::RELEVANT {
            assert_eq!(ActionKind::parse(kind.code()), kind);
        }
        assert_eq!(ActionKind::parse("SpinOffDividend"), ActionKind::SpinoffDividend);
        assert_eq!(ActionKind::parse("somethingnew"), ActionKind::Unknown);
    }

    #[test]
    fn relevance_and_delisting_sets() {
        assert!(ActionKind::Split.is_relevant());
        assert!(!ActionKind::TickerChangeTo.is_relevant());
        assert!(!ActionKind::Spinoff.is_relevant());
        assert!(ActionKind::AcquisitionBy.is_delisting());
        assert!(!ActionKind::AcquisitionOf.is_delisting());
        assert!(!ActionKind::BankruptcyLiquidation.is_delisting());
    }

    #[test]
    fn decodes_action_row() {
        let schema = RawAction::schema();
        let values = vec![
            RawValue::from("2020-08-31"),
            RawValue::from("split"),
            RawValue::from("AAPL"),
            RawValue::from("Apple Inc"),
            RawValue::Number(4.0),
            RawValue::Null,
            RawValue::Null,
        ];
        let a = RawAction::decode(&values, &schema).unwrap();
        assert_eq!(a.action, ActionKind::Split);
        assert_eq!(a.value, 4.0);
        assert_eq!(a.date, NaiveDate::from_ymd_opt(2020, 8, 31).unwrap());
        assert_eq!(a.contra_ticker, "");
    }

    #[test]
    fn action_without_date_is_rejected() {
        let schema = Schema::of(&[("date", "Date"), ("action", "String")]);
        let err = RawAction::decode(&[RawValue::Null, RawValue::from("split")], &schema)
            .unwrap_err();
        assert_eq!(err, DecodeError::MissingValue { field: "date".into() });
    }
}
