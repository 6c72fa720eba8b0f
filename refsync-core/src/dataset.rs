//! Dataset orchestration: fetch tickers, actions and prices, then reconcile.
//!
//! Phases run strictly in order and the first failure aborts the run. Each
//! phase collects its rows completely before touching the maps, so a failed
//! phase leaves no partial entries behind.

use crate::config::{ApiConfig, BulkConfig, RefsyncConfig};
use crate::data::{
    parse_stream, BatchConfig, BulkExport, FetchError, Filter, ProgressMonitor, RowIterator,
    TableQuery, Transport,
};
use crate::domain::{ActionKind, ActionRecord, Price, PriceTable, RawAction, Ticker};
use crate::reconcile::reconcile_all;
use crate::store::{DatasetSink, StoreError};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Failure of a full download run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Where rows come from: a transport plus the settings every phase needs.
pub struct Source<'t> {
    transport: &'t dyn Transport,
    api: ApiConfig,
    bulk: BulkConfig,
    progress: Option<Arc<dyn ProgressMonitor>>,
}

impl<'t> Source<'t> {
    pub fn new(transport: &'t dyn Transport, config: &RefsyncConfig) -> Self {
        Self {
            transport,
            api: config.api.clone(),
            bulk: config.bulk.clone(),
            progress: None,
        }
    }

    /// Report bulk export progress to `monitor`.
    pub fn with_progress(mut self, monitor: Arc<dyn ProgressMonitor>) -> Self {
        self.progress = Some(monitor);
        self
    }

    fn query(&self, code: &str) -> TableQuery {
        TableQuery::new(self.api.table(code)).per_page(self.api.page_size)
    }
}

/// Row counts of a dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatasetSummary {
    pub tickers: usize,
    pub raw_actions: usize,
    pub prices: usize,
    pub actions: usize,
}

impl fmt::Display for DatasetSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tickers, {} raw actions, {} prices, {} action records",
            self.tickers, self.raw_actions, self.prices, self.actions
        )
    }
}

/// Everything fetched for one run, keyed by ticker symbol.
///
/// The maps are unordered. Per-ticker lists are sorted by date once their
/// phase completes.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub tickers: HashMap<String, Ticker>,
    pub raw_actions: HashMap<String, Vec<RawAction>>,
    pub prices: HashMap<String, Vec<Price>>,
    pub actions: HashMap<String, Vec<ActionRecord>>,
}

impl Dataset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            tickers: self.tickers.len(),
            raw_actions: self.raw_actions.values().map(Vec::len).sum(),
            prices: self.prices.values().map(Vec::len).sum(),
            actions: self.actions.values().map(Vec::len).sum(),
        }
    }

    /// Fetch ticker metadata for the given price tables.
    ///
    /// Existing entries with the same symbol are overwritten.
    pub fn fetch_tickers(
        &mut self,
        source: &Source<'_>,
        tables: &[PriceTable],
    ) -> Result<usize, FetchError> {
        let codes: Vec<&str> = PriceTable::or_default(tables)
            .iter()
            .map(PriceTable::code)
            .collect();
        let query = source.query("TICKERS").filter(Filter::is_in("table", &codes));

        let rows: Vec<Ticker> = RowIterator::new(source.transport, query).collect::<Result<_, _>>()?;
        let count = rows.len();
        for ticker in rows {
            self.tickers.insert(ticker.ticker.clone(), ticker);
        }

        info!(tickers = count, tables = ?codes, "tickers fetched");
        Ok(count)
    }

    /// Fetch the reconciler-relevant raw actions of known tickers.
    pub fn fetch_actions(&mut self, source: &Source<'_>) -> Result<usize, FetchError> {
        let codes: Vec<&str> = ActionKind::RELEVANT.iter().map(ActionKind::code).collect();
        let query = source.query("ACTIONS").filter(Filter::is_in("action", &codes));

        let rows: Vec<RawAction> =
            RowIterator::new(source.transport, query).collect::<Result<_, _>>()?;

        let mut grouped: HashMap<String, Vec<RawAction>> = HashMap::new();
        let mut unknown: HashSet<String> = HashSet::new();
        for action in rows {
            if !self.tickers.contains_key(&action.ticker) {
                if unknown.insert(action.ticker.clone()) {
                    warn!(ticker = %action.ticker, "dropping actions for unknown ticker");
                }
                continue;
            }
            grouped.entry(action.ticker.clone()).or_default().push(action);
        }

        let mut count = 0;
        for (symbol, mut actions) in grouped {
            actions.sort_by_key(|a| a.date);
            count += actions.len();
            self.raw_actions.insert(symbol, actions);
        }

        info!(actions = count, unknown_tickers = unknown.len(), "actions fetched");
        Ok(count)
    }

    /// Bulk-download one price table and merge it into the price map.
    ///
    /// Requires tickers to be fetched first: rows of unknown tickers are dropped.
    pub fn bulk_download_prices(
        &mut self,
        source: &Source<'_>,
        table: PriceTable,
    ) -> Result<usize, FetchError> {
        let query = TableQuery::new(source.api.table(table.code()));
        let mut export = BulkExport::new(source.transport, query);
        if let Some(monitor) = &source.progress {
            export = export.with_progress(Arc::clone(monitor), source.bulk.progress_interval_bytes);
        }

        let mut archive = export.open()?;
        let mut stream = archive.csv()?;

        let tickers = &self.tickers;
        let is_known = |symbol: &str| tickers.contains_key(symbol);
        let (grouped, stats) = parse_stream::<Price, _>(
            export.table(),
            &mut stream,
            &is_known,
            BatchConfig::from(&source.bulk),
        )?;

        let mut count = 0;
        for (symbol, mut prices) in grouped {
            sort_prices(&symbol, &mut prices);
            count += prices.len();
            self.prices.insert(symbol, prices);
        }

        info!(
            table = %table,
            prices = count,
            batches = stats.batches,
            dropped = stats.dropped,
            unknown_tickers = stats.unknown_tickers,
            "prices merged"
        );
        Ok(count)
    }

    /// Rebuild the reconciled action records from prices and raw actions.
    pub fn reconcile_actions(&mut self) -> usize {
        self.actions = reconcile_all(&self.tickers, &self.raw_actions, &self.prices);
        let records = self.actions.values().map(Vec::len).sum();
        info!(tickers = self.actions.len(), records, "reconciliation finished");
        records
    }
}

/// Sort a ticker's prices by date. Of duplicate dates the most recently
/// updated row survives, then the lowest close, independent of arrival order.
fn sort_prices(symbol: &str, prices: &mut Vec<Price>) {
    prices.sort_by(|a, b| {
        a.date
            .cmp(&b.date)
            .then_with(|| b.last_updated.cmp(&a.last_updated))
            .then_with(|| a.close.total_cmp(&b.close))
    });
    let before = prices.len();
    prices.dedup_by_key(|p| p.date);
    if prices.len() != before {
        warn!(
            ticker = symbol,
            dropped = before - prices.len(),
            "duplicate price dates dropped"
        );
    }
}

/// Run every phase: tickers, relevant actions, each price table,
/// reconciliation, then hand the dataset to `sink`.
///
/// With no tables requested, equities and funds are fetched.
pub fn download_all(
    source: &Source<'_>,
    tables: &[PriceTable],
    sink: &dyn DatasetSink,
) -> Result<Dataset, RunError> {
    let tables = PriceTable::or_default(tables);
    let mut dataset = Dataset::new();

    dataset.fetch_tickers(source, &tables)?;
    dataset.fetch_actions(source)?;
    for table in &tables {
        dataset.bulk_download_prices(source, *table)?;
    }
    dataset.reconcile_actions();

    sink.persist(&dataset)?;
    info!(summary = %dataset.summary(), "dataset persisted");
    Ok(dataset)
}
