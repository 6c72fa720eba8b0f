//! End-to-end `download_all` over seed data: three tickers, two price tables.

mod common;

use chrono::NaiveDate;
use common::{action_row, price_csv, ticker_row, zip_bytes, FakeTransport};
use refsync_core::config::RefsyncConfig;
use refsync_core::decode::Decode;
use refsync_core::domain::{ActionRecord, PriceTable, RawAction, Ticker};
use refsync_core::{download_all, Dataset, DatasetSink, ParquetStore, RunError, Source, StoreError};
use std::sync::Mutex;

#[derive(Default)]
struct MemorySink(Mutex<Option<Dataset>>);

impl DatasetSink for MemorySink {
    fn persist(&self, dataset: &Dataset) -> Result<(), StoreError> {
        *self.0.lock().unwrap() = Some(dataset.clone());
        Ok(())
    }
}

fn d(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
}

fn config() -> RefsyncConfig {
    let mut config = RefsyncConfig::default();
    config.bulk.batch_size = 2;
    config.bulk.workers = 2;
    config
}

/// A: delisted upstream but no terminal event in the feed.
/// B: delisted then relisted with a split.
/// C: no actions at all, listed on the funds table.
fn seed_transport() -> FakeTransport {
    let tickers = vec![
        vec![ticker_row("SEP", "A", true), ticker_row("SEP", "B", false)],
        vec![ticker_row("SFP", "C", false)],
    ];
    let actions = vec![vec![
        action_row("2024-03-01", "listed", "A", 0.0),
        action_row("2024-03-02", "dividend", "A", 2.0),
        action_row("2024-03-03", "split", "A", 2.0),
        action_row("2024-03-04", "delisted", "B", 0.0),
        action_row("2024-03-05", "listed", "B", 0.0),
        action_row("2024-03-05", "split", "B", 4.0),
        action_row("2024-03-05", "dividend", "GHOST", 1.0),
    ]];

    let sep = price_csv(&[
        ("A", "2024-03-01", 10.0),
        ("B", "2024-03-01", 50.0),
        ("B", "2024-03-04", 51.0),
        ("A", "2024-03-04", 5.0),
        ("GHOST", "2024-03-04", 1.0),
        ("A", "2024-03-05", 5.5),
        ("B", "2024-03-05", 13.0),
    ]);
    let sfp = price_csv(&[
        ("C", "2024-03-05", 30.0),
        ("C", "2024-03-01", 30.0),
        ("C", "2024-03-04", 31.0),
    ]);

    FakeTransport::new()
        .with_pages("SHARADAR/TICKERS", &Ticker::schema(), tickers)
        .with_pages("SHARADAR/ACTIONS", &RawAction::schema(), actions)
        .with_export("SHARADAR/SEP", "fresh", zip_bytes(&[("SHARADAR_SEP.csv", &sep)]))
        .with_export("SHARADAR/SFP", "fresh", zip_bytes(&[("SHARADAR_SFP.csv", &sfp)]))
}

#[test]
fn seed_scenario_reconciles_every_ticker() {
    let transport = seed_transport();
    let config = config();
    let source = Source::new(&transport, &config);
    let sink = MemorySink::default();

    let dataset = download_all(&source, &[], &sink).unwrap();

    assert_eq!(dataset.tickers.len(), 3);
    assert!(!dataset.prices.contains_key("GHOST"));
    assert!(!dataset.raw_actions.contains_key("GHOST"));
    for prices in dataset.prices.values() {
        assert_eq!(prices.len(), 3);
        assert!(prices.windows(2).all(|w| w[0].date < w[1].date));
    }

    // A: listed, merged dividend + split, appended delisting.
    let a = &dataset.actions["A"];
    assert_eq!(a.len(), 3);
    assert_eq!(a[0], ActionRecord::neutral(d(1), true));
    assert_eq!(a[1].date, d(4));
    assert!((a[1].dividend_factor - 0.8).abs() < 1e-12);
    assert!((a[1].split_factor - 0.5).abs() < 1e-12);
    assert!(a[1].active);
    assert_eq!(a[2], ActionRecord::neutral(d(5), false));

    // B: auto-listed, delisted, relisted with a split.
    let b = &dataset.actions["B"];
    assert_eq!(b.len(), 3);
    assert_eq!(b[0], ActionRecord::neutral(d(1), true));
    assert_eq!(b[1], ActionRecord::neutral(d(4), false));
    assert_eq!(b[2].date, d(5));
    assert!(b[2].active);
    assert_eq!(b[2].split_factor, 0.25);
    assert_eq!(b[2].dividend_factor, 1.0);

    // C: auto-listed only.
    assert_eq!(dataset.actions["C"], vec![ActionRecord::neutral(d(1), true)]);

    let persisted = sink.0.lock().unwrap().take().unwrap();
    assert_eq!(persisted.actions, dataset.actions);
}

#[test]
fn explicit_table_selection_skips_other_exports() {
    let transport = seed_transport();
    let config = config();
    let source = Source::new(&transport, &config);

    let dataset = download_all(&source, &[PriceTable::Equities], &MemorySink::default()).unwrap();

    assert!(dataset.prices.contains_key("A"));
    assert!(!dataset.prices.contains_key("C"));
    assert!(!dataset.actions.contains_key("C"));
    let requests = transport.requests.lock().unwrap();
    assert!(!requests.iter().any(|(path, _)| path.contains("SFP")));
}

#[test]
fn failed_phase_aborts_before_persisting() {
    let transport = FakeTransport::new()
        .with_pages("SHARADAR/TICKERS", &Ticker::schema(), vec![vec![ticker_row("SEP", "A", false)]])
        .with_pages("SHARADAR/ACTIONS", &RawAction::schema(), vec![vec![]])
        .with_export("SHARADAR/SEP", "creating", Vec::new());
    let config = config();
    let source = Source::new(&transport, &config);
    let sink = MemorySink::default();

    let err = download_all(&source, &[PriceTable::Equities], &sink).unwrap_err();

    assert!(matches!(err, RunError::Fetch(_)));
    assert!(sink.0.lock().unwrap().is_none());
}

#[test]
fn seed_scenario_round_trips_through_parquet() {
    let transport = seed_transport();
    let config = config();
    let source = Source::new(&transport, &config);
    let dir = tempfile::tempdir().unwrap();
    let store = ParquetStore::new(dir.path());

    let dataset = download_all(&source, &[], &store).unwrap();

    assert_eq!(store.load_actions().unwrap(), dataset.actions);
    let meta = store.meta().unwrap();
    assert_eq!(meta.tickers, 3);
    assert_eq!(meta.prices, 9);
    assert_eq!(meta.actions, 7);
}
