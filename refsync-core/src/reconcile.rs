//! Action reconciliation.
//!
//! Merges a ticker's sparse raw corporate actions into its dense price series,
//! producing one [`ActionRecord`] per price date at which something observable
//! changed. Both inputs must already be sorted by date.
//!
//! Walk: two pointers, one over prices and one over actions. At each price
//! every not-yet-consumed action dated on or before it is folded into a
//! candidate record; the candidate is emitted only if some action altered it.
//!
//! Boundaries:
//! - the first price always yields a record (a neutral `listed` one if nothing
//!   else happened there);
//! - the last record's `active` flag is forced to agree with the ticker's
//!   authoritative status, in place when dated at the last price, otherwise by
//!   appending a neutral record at the last price.
//!
//! Dividends due before the first price have no previous close to divide by
//! and are dropped.

use crate::domain::{ActionKind, ActionRecord, Price, RawAction, Ticker};
use rayon::prelude::*;
use std::collections::HashMap;

/// The adjustment being accumulated for one price date.
struct Candidate {
    record: ActionRecord,
    altered: bool,
}

impl Candidate {
    fn at(price: &Price) -> Self {
        Self {
            record: ActionRecord::neutral(price.date, true),
            altered: false,
        }
    }

    /// Fold one raw action in. `prev_close` is the previous price's
    /// split-adjusted close, or 0.0 at the first price.
    fn apply(&mut self, action: &RawAction, prev_close: f64) {
        match action.action {
            ActionKind::Listed => {
                self.record.active = true;
                self.altered = true;
            }
            kind if kind.is_delisting() => {
                self.record.active = false;
                self.altered = true;
            }
            kind if kind.is_dividend() => {
                if prev_close > 0.0 {
                    self.record.dividend_factor *= (prev_close - action.value) / prev_close;
                    self.altered = true;
                }
            }
            ActionKind::Split => {
                if action.value > 0.0 {
                    self.record.split_factor *= 1.0 / action.value;
                    self.altered = true;
                }
            }
            _ => {}
        }
    }
}

/// Reconcile one ticker.
///
/// `final_active` is the ticker's authoritative status; `None` skips the
/// end-of-series repair. Returns an empty list when there are no prices.
pub fn reconcile_ticker(
    prices: &[Price],
    actions: &[RawAction],
    final_active: Option<bool>,
) -> Vec<ActionRecord> {
    let Some(last_price) = prices.last() else {
        return Vec::new();
    };

    let mut out: Vec<ActionRecord> = Vec::new();
    let mut next = 0usize;
    let mut prev_close = 0.0;

    for (i, price) in prices.iter().enumerate() {
        let mut candidate = Candidate::at(price);

        while next < actions.len() && actions[next].date <= price.date {
            candidate.apply(&actions[next], prev_close);
            next += 1;
        }
        prev_close = price.close_split_adjusted();

        if i == 0 && !candidate.altered {
            candidate.record = ActionRecord::neutral(price.date, true);
            candidate.altered = true;
        }

        if candidate.altered {
            out.push(candidate.record);
        }
    }

    if let (Some(expected), Some(last)) = (final_active, out.last_mut()) {
        if last.active != expected {
            if last.date == last_price.date {
                last.active = expected;
            } else {
                out.push(ActionRecord::neutral(last_price.date, expected));
            }
        }
    }

    out
}

/// Reconcile every ticker that has prices, in parallel.
///
/// Tickers absent from `tickers` are reconciled without end repair.
pub fn reconcile_all(
    tickers: &HashMap<String, Ticker>,
    raw_actions: &HashMap<String, Vec<RawAction>>,
    prices: &HashMap<String, Vec<Price>>,
) -> HashMap<String, Vec<ActionRecord>> {
    prices
        .par_iter()
        .filter(|(_, series)| !series.is_empty())
        .map(|(symbol, series)| {
            let actions = raw_actions.get(symbol).map_or(&[][..], Vec::as_slice);
            let final_active = tickers.get(symbol).map(|t| t.active);
            (symbol.clone(), reconcile_ticker(series, actions, final_active))
        })
        .collect()
}
