//! Property tests for reconciler invariants.
//!
//! Uses proptest to verify, for arbitrary price series and action feeds:
//! 1. Record dates are strictly ascending and fall on price dates
//! 2. The first record is dated at the first price
//! 3. The last record's `active` matches the authoritative status
//! 4. Dividends below the previous close keep the factor in (0, 1]
//! 5. Reconciliation is a pure function of its inputs

use chrono::NaiveDate;
use proptest::prelude::*;
use refsync_core::domain::{ActionKind, Price, RawAction};
use refsync_core::reconcile_ticker;
use std::collections::HashSet;

// ── Strategies (proptest) ────────────────────────────────────────────

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap()
}

/// 1..40 prices on strictly increasing dates with closes in [1, 100).
fn arb_prices() -> impl Strategy<Value = Vec<Price>> {
    prop::collection::vec((1u32..5, 1.0..100.0_f64), 1..40).prop_map(|steps| {
        let mut day = 0i64;
        steps
            .into_iter()
            .map(|(gap, close)| {
                day += gap as i64;
                Price {
                    ticker: "P".into(),
                    date: base() + chrono::Duration::days(day),
                    close,
                    ..Price::default()
                }
            })
            .collect()
    })
}

fn arb_kind() -> impl Strategy<Value = ActionKind> {
    prop::sample::select(vec![
        ActionKind::Listed,
        ActionKind::Delisted,
        ActionKind::AcquisitionBy,
        ActionKind::MergerFrom,
        ActionKind::RegulatoryDelisting,
        ActionKind::VoluntaryDelisting,
        ActionKind::Dividend,
        ActionKind::SpinoffDividend,
        ActionKind::Split,
        ActionKind::Spinoff,
        ActionKind::TickerChangeTo,
    ])
}

/// Sorted actions spread over (and a bit beyond) the price window.
fn arb_actions() -> impl Strategy<Value = Vec<RawAction>> {
    prop::collection::vec((-10i64..200, arb_kind(), -1.0..5.0_f64), 0..30).prop_map(|raw| {
        let mut actions: Vec<RawAction> = raw
            .into_iter()
            .map(|(offset, action, value)| RawAction {
                date: base() + chrono::Duration::days(offset),
                action,
                ticker: "P".into(),
                value,
                ..RawAction::default()
            })
            .collect();
        actions.sort_by_key(|a| a.date);
        actions
    })
}

proptest! {
    #[test]
    fn dates_strictly_ascending_on_price_dates(
        prices in arb_prices(),
        actions in arb_actions(),
        active in any::<bool>(),
    ) {
        let out = reconcile_ticker(&prices, &actions, Some(active));
        let price_dates: HashSet<NaiveDate> = prices.iter().map(|p| p.date).collect();

        prop_assert!(out.windows(2).all(|w| w[0].date < w[1].date));
        prop_assert!(out.iter().all(|r| price_dates.contains(&r.date)));
    }

    #[test]
    fn first_record_at_first_price(
        prices in arb_prices(),
        actions in arb_actions(),
        active in any::<bool>(),
    ) {
        let out = reconcile_ticker(&prices, &actions, Some(active));
        prop_assert!(!out.is_empty());
        prop_assert_eq!(out[0].date, prices[0].date);
    }

    #[test]
    fn final_status_is_authoritative(
        prices in arb_prices(),
        actions in arb_actions(),
        active in any::<bool>(),
    ) {
        let out = reconcile_ticker(&prices, &actions, Some(active));
        prop_assert_eq!(out.last().map(|r| r.active), Some(active));
        prop_assert!(out.len() <= prices.len());
    }

    #[test]
    fn small_dividends_keep_factor_in_unit_interval(
        prices in arb_prices(),
        fractions in prop::collection::vec(0.0..0.99_f64, 1..10),
    ) {
        // One dividend per price gap, each below the preceding close.
        let actions: Vec<RawAction> = prices
            .windows(2)
            .zip(fractions.iter().cycle())
            .map(|(w, f)| RawAction {
                date: w[1].date,
                action: ActionKind::Dividend,
                value: w[0].close * f,
                ..RawAction::default()
            })
            .collect();

        let out = reconcile_ticker(&prices, &actions, None);
        for record in &out {
            prop_assert!(record.dividend_factor > 0.0 && record.dividend_factor <= 1.0);
            prop_assert_eq!(record.split_factor, 1.0);
        }
    }

    #[test]
    fn reconciliation_is_deterministic(
        prices in arb_prices(),
        actions in arb_actions(),
    ) {
        let first = reconcile_ticker(&prices, &actions, Some(true));
        let second = reconcile_ticker(&prices, &actions, Some(true));
        prop_assert_eq!(first, second);
    }
}
