//! Persistence sink and its Parquet implementation.
//!
//! Layout of a store directory:
//! - `tickers.parquet`
//! - `prices.parquet` (ticker, date ascending)
//! - `actions.parquet` (ticker, date ascending)
//! - `meta.json` sidecar: write time, row counts, hash of the action records
//!
//! Every file is written to `.tmp` and renamed into place.

use crate::dataset::Dataset;
use crate::domain::{ActionRecord, Price, Ticker};
use chrono::NaiveDate;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet I/O error: {0}")]
    Parquet(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("no stored dataset in {}; run `refsync download` first", dir.display())]
    Empty { dir: PathBuf },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Receiver of a finished dataset.
pub trait DatasetSink: Send + Sync {
    fn persist(&self, dataset: &Dataset) -> Result<(), StoreError>;
}

/// Sidecar describing the last persisted dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMeta {
    pub written_at: chrono::NaiveDateTime,
    pub tickers: usize,
    pub prices: usize,
    pub actions: usize,
    /// BLAKE3 of the action records in ticker/date order.
    pub actions_hash: String,
}

/// Parquet files in one directory.
pub struct ParquetStore {
    dir: PathBuf,
}

impl ParquetStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    /// Metadata of the stored dataset, if any.
    pub fn meta(&self) -> Result<StoreMeta, StoreError> {
        let path = self.path("meta.json");
        if !path.exists() {
            return Err(StoreError::Empty {
                dir: self.dir.clone(),
            });
        }
        let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_str(&content)
            .map_err(|e| StoreError::Serialization(format!("meta.json: {e}")))
    }

    /// Read the reconciled action records back, keyed by ticker.
    pub fn load_actions(&self) -> Result<HashMap<String, Vec<ActionRecord>>, StoreError> {
        let path = self.path("actions.parquet");
        if !path.exists() {
            return Err(StoreError::Empty {
                dir: self.dir.clone(),
            });
        }
        let df = read_parquet(&path)?;
        dataframe_to_actions(&df)
    }
}

impl DatasetSink for ParquetStore {
    fn persist(&self, dataset: &Dataset) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;

        let tickers = sorted_tickers(&dataset.tickers);
        let prices = flatten_sorted(&dataset.prices);
        let actions = flatten_sorted(&dataset.actions);

        write_atomic(&self.path("tickers.parquet"), &mut tickers_to_dataframe(&tickers)?)?;
        write_atomic(&self.path("prices.parquet"), &mut prices_to_dataframe(&prices)?)?;
        write_atomic(&self.path("actions.parquet"), &mut actions_to_dataframe(&actions)?)?;

        let meta = StoreMeta {
            written_at: chrono::Local::now().naive_local(),
            tickers: tickers.len(),
            prices: prices.len(),
            actions: actions.len(),
            actions_hash: blake3::hash(
                &serde_json::to_vec(&actions)
                    .map_err(|e| StoreError::Serialization(format!("hash input: {e}")))?,
            )
            .to_hex()
            .to_string(),
        };
        let meta_json = serde_json::to_string_pretty(&meta)
            .map_err(|e| StoreError::Serialization(format!("meta: {e}")))?;
        let meta_path = self.path("meta.json");
        let tmp = meta_path.with_extension("json.tmp");
        fs::write(&tmp, meta_json).map_err(|e| StoreError::io(&tmp, e))?;
        rename_into_place(&tmp, &meta_path)?;

        info!(
            dir = %self.dir.display(),
            tickers = meta.tickers,
            prices = meta.prices,
            actions = meta.actions,
            "store written"
        );
        Ok(())
    }
}

fn sorted_tickers(tickers: &HashMap<String, Ticker>) -> Vec<&Ticker> {
    let mut rows: Vec<&Ticker> = tickers.values().collect();
    rows.sort_by(|a, b| a.ticker.cmp(&b.ticker));
    rows
}

/// Per-ticker lists concatenated in ticker order. Lists are already date sorted.
fn flatten_sorted<T>(map: &HashMap<String, Vec<T>>) -> Vec<(&str, &T)> {
    let mut symbols: Vec<&String> = map.keys().collect();
    symbols.sort();
    symbols
        .into_iter()
        .flat_map(|s| map[s].iter().map(move |row| (s.as_str(), row)))
        .collect()
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn epoch() -> NaiveDate {
    NaiveDate::default()
}

fn days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

fn date_column(name: &str, values: Vec<Option<i32>>) -> Result<Column, StoreError> {
    Column::new(name.into(), values)
        .cast(&DataType::Date)
        .map_err(|e| StoreError::Parquet(format!("{name} cast: {e}")))
}

fn tickers_to_dataframe(rows: &[&Ticker]) -> Result<DataFrame, StoreError> {
    let text = |f: fn(&Ticker) -> &str| rows.iter().map(|t| f(t).to_string()).collect::<Vec<_>>();
    let date = |f: fn(&Ticker) -> Option<NaiveDate>| {
        rows.iter().map(|t| f(t).map(days)).collect::<Vec<_>>()
    };

    DataFrame::new(vec![
        Column::new("ticker".into(), text(|t| t.ticker.as_str())),
        Column::new("table".into(), text(|t| t.table.as_str())),
        Column::new(
            "permaticker".into(),
            rows.iter().map(|t| t.permaticker).collect::<Vec<i64>>(),
        ),
        Column::new("name".into(), text(|t| t.name.as_str())),
        Column::new("exchange".into(), text(|t| t.exchange.as_str())),
        Column::new(
            "active".into(),
            rows.iter().map(|t| t.active).collect::<Vec<bool>>(),
        ),
        Column::new("category".into(), text(|t| t.category.as_str())),
        Column::new("sector".into(), text(|t| t.sector.as_str())),
        Column::new("industry".into(), text(|t| t.industry.as_str())),
        Column::new("scalemarketcap".into(), text(|t| t.scale_market_cap.as_str())),
        Column::new("scalerevenue".into(), text(|t| t.scale_revenue.as_str())),
        Column::new("currency".into(), text(|t| t.currency.as_str())),
        Column::new("location".into(), text(|t| t.location.as_str())),
        date_column("firstpricedate", date(|t| t.first_price_date))?,
        date_column("lastpricedate", date(|t| t.last_price_date))?,
        date_column("lastupdated", date(|t| t.last_updated))?,
    ])
    .map_err(|e| StoreError::Parquet(format!("tickers dataframe: {e}")))
}

fn prices_to_dataframe(rows: &[(&str, &Price)]) -> Result<DataFrame, StoreError> {
    let num = |f: fn(&Price) -> f64| rows.iter().map(|(_, p)| f(p)).collect::<Vec<f64>>();

    DataFrame::new(vec![
        Column::new(
            "ticker".into(),
            rows.iter().map(|(s, _)| s.to_string()).collect::<Vec<_>>(),
        ),
        date_column(
            "date",
            rows.iter().map(|(_, p)| Some(days(p.date))).collect(),
        )?,
        Column::new("open".into(), num(|p| p.open)),
        Column::new("high".into(), num(|p| p.high)),
        Column::new("low".into(), num(|p| p.low)),
        Column::new("close".into(), num(|p| p.close)),
        Column::new("volume".into(), num(|p| p.volume)),
        Column::new("closeadj".into(), num(|p| p.close_fully_adjusted)),
        Column::new("closeunadj".into(), num(|p| p.close_unadjusted)),
        date_column(
            "lastupdated",
            rows.iter().map(|(_, p)| p.last_updated.map(days)).collect(),
        )?,
    ])
    .map_err(|e| StoreError::Parquet(format!("prices dataframe: {e}")))
}

fn actions_to_dataframe(rows: &[(&str, &ActionRecord)]) -> Result<DataFrame, StoreError> {
    DataFrame::new(vec![
        Column::new(
            "ticker".into(),
            rows.iter().map(|(s, _)| s.to_string()).collect::<Vec<_>>(),
        ),
        date_column(
            "date",
            rows.iter().map(|(_, a)| Some(days(a.date))).collect(),
        )?,
        Column::new(
            "dividend_factor".into(),
            rows.iter().map(|(_, a)| a.dividend_factor).collect::<Vec<f64>>(),
        ),
        Column::new(
            "split_factor".into(),
            rows.iter().map(|(_, a)| a.split_factor).collect::<Vec<f64>>(),
        ),
        Column::new(
            "active".into(),
            rows.iter().map(|(_, a)| a.active).collect::<Vec<bool>>(),
        ),
    ])
    .map_err(|e| StoreError::Parquet(format!("actions dataframe: {e}")))
}

fn rename_into_place(tmp: &Path, path: &Path) -> Result<(), StoreError> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        StoreError::io(path, e)
    })
}

/// Write a DataFrame to `{path}.tmp`, then rename it over `path`.
fn write_atomic(path: &Path, df: &mut DataFrame) -> Result<(), StoreError> {
    let tmp = path.with_extension("parquet.tmp");
    let file = fs::File::create(&tmp).map_err(|e| StoreError::io(&tmp, e))?;
    ParquetWriter::new(file)
        .finish(df)
        .map_err(|e| StoreError::Parquet(format!("write {}: {e}", path.display())))?;
    rename_into_place(&tmp, path)?;
    debug!(path = %path.display(), rows = df.height(), "parquet written");
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame, StoreError> {
    let file = fs::File::open(path).map_err(|e| StoreError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| StoreError::Parquet(format!("read {}: {e}", path.display())))
}

fn type_err(name: &'static str) -> impl Fn(PolarsError) -> StoreError {
    move |e| StoreError::Parquet(format!("{name} column type: {e}"))
}

fn dataframe_to_actions(
    df: &DataFrame,
) -> Result<HashMap<String, Vec<ActionRecord>>, StoreError> {
    let column = |name: &str| {
        df.column(name)
            .map_err(|_| StoreError::Validation(format!("missing column '{name}'")))
    };

    let tickers = column("ticker")?.str().map_err(type_err("ticker"))?;
    let dates = column("date")?.date().map_err(type_err("date"))?;
    let dividends = column("dividend_factor")?
        .f64()
        .map_err(type_err("dividend_factor"))?;
    let splits = column("split_factor")?
        .f64()
        .map_err(type_err("split_factor"))?;
    let active = column("active")?.bool().map_err(type_err("active"))?;

    let mut out: HashMap<String, Vec<ActionRecord>> = HashMap::new();
    for i in 0..df.height() {
        let symbol = tickers
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null ticker at row {i}")))?;
        let day = dates
            .get(i)
            .ok_or_else(|| StoreError::Validation(format!("null date at row {i}")))?;

        out.entry(symbol.to_string()).or_default().push(ActionRecord {
            date: epoch() + chrono::Duration::days(day as i64),
            dividend_factor: dividends.get(i).unwrap_or(1.0),
            split_factor: splits.get(i).unwrap_or(1.0),
            active: active.get(i).unwrap_or(true),
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn sample() -> Dataset {
        let mut dataset = Dataset::new();
        dataset.tickers.insert(
            "B".into(),
            Ticker {
                ticker: "B".into(),
                table: "SEP".into(),
                active: true,
                first_price_date: Some(d(1)),
                ..Ticker::default()
            },
        );
        dataset.prices.insert(
            "B".into(),
            vec![Price {
                ticker: "B".into(),
                date: d(1),
                close: 10.0,
                ..Price::default()
            }],
        );
        dataset.actions.insert(
            "B".into(),
            vec![
                ActionRecord::neutral(d(1), true),
                ActionRecord {
                    date: d(2),
                    dividend_factor: 0.8,
                    split_factor: 0.5,
                    active: true,
                },
            ],
        );
        dataset
            .actions
            .insert("A".into(), vec![ActionRecord::neutral(d(3), false)]);
        dataset
    }

    #[test]
    fn persist_and_load_actions() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        store.persist(&sample()).unwrap();

        let loaded = store.load_actions().unwrap();
        assert_eq!(loaded, sample().actions);

        let meta = store.meta().unwrap();
        assert_eq!(meta.tickers, 1);
        assert_eq!(meta.prices, 1);
        assert_eq!(meta.actions, 3);
        assert_eq!(meta.actions_hash.len(), 64);
        assert!(!dir.path().join("actions.parquet.tmp").exists());
    }

    #[test]
    fn hash_is_independent_of_map_order() {
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();
        ParquetStore::new(dir_a.path()).persist(&sample()).unwrap();
        ParquetStore::new(dir_b.path()).persist(&sample().clone()).unwrap();
        assert_eq!(
            ParquetStore::new(dir_a.path()).meta().unwrap().actions_hash,
            ParquetStore::new(dir_b.path()).meta().unwrap().actions_hash
        );
    }

    #[test]
    fn empty_store_reports_missing_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = ParquetStore::new(dir.path());
        assert!(matches!(store.meta(), Err(StoreError::Empty { .. })));
        assert!(matches!(store.load_actions(), Err(StoreError::Empty { .. })));
    }

    #[test]
    fn flatten_orders_by_ticker() {
        let dataset = sample();
        let flat = flatten_sorted(&dataset.actions);
        let symbols: Vec<&str> = flat.iter().map(|(s, _)| *s).collect();
        assert_eq!(symbols, vec!["A", "B", "B"]);
    }
}
