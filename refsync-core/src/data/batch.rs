//! Parallel batch parsing of CSV row streams.
//!
//! The calling thread reads rows in fixed-size batches and hands each batch to
//! a private rayon pool. Workers parse their batch into a local
//! ticker → records map and send it back over a channel; the calling thread is
//! the only reducer. Batches complete in arbitrary order, so callers must not
//! rely on the order of records within a ticker's list.
//!
//! The first decode error raises a shared cancellation flag: no further batches
//! are dispatched, queued jobs skip their work, and every in-flight job is
//! drained before the error is returned.

use super::provider::FetchError;
use crate::decode::{CsvColumns, FromCsvRecord};
use csv::StringRecord;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, warn};

use super::export::CsvStream;

/// Batch parsing parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchConfig {
    /// Rows per batch. Must be > 0.
    pub batch_size: usize,
    /// Worker threads.
    pub workers: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 10_000,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl From<&crate::config::BulkConfig> for BatchConfig {
    fn from(config: &crate::config::BulkConfig) -> Self {
        Self {
            batch_size: config.batch_size,
            workers: config.worker_count(),
        }
    }
}

/// Per-ticker records.
pub type Grouped<T> = HashMap<String, Vec<T>>;

/// Summary counters of one parse run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub batches: usize,
    pub rows: usize,
    pub kept: usize,
    pub dropped: usize,
    /// Distinct unknown tickers whose rows were dropped.
    pub unknown_tickers: usize,
}

type BatchResult<T> = Result<Grouped<T>, FetchError>;

/// Parse one batch into a local map. Pure per row.
fn parse_batch<T: FromCsvRecord>(
    table: &str,
    rows: &[StringRecord],
    columns: &CsvColumns,
) -> BatchResult<T> {
    let mut grouped: Grouped<T> = HashMap::new();
    for row in rows {
        let record = T::from_csv(row, columns).map_err(|e| {
            let line = row.position().map_or(0, |p| p.line());
            FetchError::decode(format!("{table} line {line}"), e)
        })?;
        grouped
            .entry(record.ticker().to_string())
            .or_default()
            .push(record);
    }
    Ok(grouped)
}

/// Reducer state living on the calling thread.
struct Reducer<'k, T> {
    merged: Grouped<T>,
    is_known: &'k dyn Fn(&str) -> bool,
    warned: HashSet<String>,
    stats: ParseStats,
    table: String,
}

impl<T> Reducer<'_, T> {
    fn merge(&mut self, fragment: Grouped<T>) {
        self.stats.batches += 1;
        for (ticker, mut records) in fragment {
            self.stats.rows += records.len();
            if !(self.is_known)(&ticker) {
                self.stats.dropped += records.len();
                if self.warned.insert(ticker.clone()) {
                    warn!(table = %self.table, ticker = %ticker, "dropping rows for unknown ticker");
                }
                continue;
            }
            self.stats.kept += records.len();
            self.merged.entry(ticker).or_default().append(&mut records);
        }
    }
}

/// Fold one batch result into the reducer. After the first error, later
/// fragments are discarded and the cancellation flag stays raised.
fn absorb<T>(
    result: BatchResult<T>,
    reducer: &mut Reducer<'_, T>,
    first_error: &mut Option<FetchError>,
    cancel: &AtomicBool,
) {
    match result {
        Ok(fragment) if first_error.is_none() => reducer.merge(fragment),
        Ok(_) => {}
        Err(e) => {
            cancel.store(true, Ordering::SeqCst);
            if first_error.is_none() {
                *first_error = Some(e);
            }
        }
    }
}

/// Parse every remaining row of `stream` into per-ticker lists.
///
/// Rows whose ticker fails `is_known` are dropped with one warning per ticker.
/// On error nothing is returned: the partially merged map is discarded.
pub fn parse_stream<T, R>(
    table: &str,
    stream: &mut CsvStream<R>,
    is_known: &dyn Fn(&str) -> bool,
    config: BatchConfig,
) -> Result<(Grouped<T>, ParseStats), FetchError>
where
    T: FromCsvRecord + Send + 'static,
    R: Read,
{
    if config.batch_size == 0 {
        return Err(FetchError::Config("batch size must be > 0".into()));
    }
    let workers = config.workers.max(1);

    let columns = Arc::new(
        CsvColumns::from_header(stream.header(), T::COLUMNS)
            .map_err(|e| FetchError::decode(format!("{table} header"), e))?,
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("refsync-parse-{i}"))
        .build()
        .map_err(|e| FetchError::Config(format!("failed to build parse pool: {e}")))?;

    let (tx, rx) = mpsc::channel::<(usize, BatchResult<T>)>();
    let cancel = Arc::new(AtomicBool::new(false));
    let max_in_flight = workers * 2;

    let mut reducer = Reducer {
        merged: HashMap::new(),
        is_known,
        warned: HashSet::new(),
        stats: ParseStats::default(),
        table: table.to_string(),
    };
    let mut first_error: Option<FetchError> = None;
    let mut in_flight = 0usize;
    let mut dispatched = 0usize;

    loop {
        if first_error.is_some() || cancel.load(Ordering::SeqCst) {
            break;
        }

        if in_flight >= max_in_flight {
            match rx.recv() {
                Ok((index, result)) => {
                    in_flight -= 1;
                    debug!(table, batch = index, "batch parsed");
                    absorb(result, &mut reducer, &mut first_error, &cancel);
                    continue;
                }
                Err(_) => break,
            }
        }

        let mut batch = Vec::with_capacity(config.batch_size);
        let mut read_error = None;
        while batch.len() < config.batch_size {
            match stream.read() {
                Ok(Some(row)) => batch.push(row),
                Ok(None) => break,
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }
        let exhausted = batch.len() < config.batch_size;

        if !batch.is_empty() {
            let index = dispatched;
            dispatched += 1;
            in_flight += 1;

            let tx = tx.clone();
            let cancel = Arc::clone(&cancel);
            let columns = Arc::clone(&columns);
            let table = table.to_string();
            pool.spawn(move || {
                let result = if cancel.load(Ordering::SeqCst) {
                    Ok(HashMap::new())
                } else {
                    parse_batch::<T>(&table, &batch, &columns)
                };
                if result.is_err() {
                    cancel.store(true, Ordering::SeqCst);
                }
                // The receiver outlives every job; a send can only fail after a panic upstream.
                let _ = tx.send((index, result));
            });
        }

        if let Some(e) = read_error {
            cancel.store(true, Ordering::SeqCst);
            first_error = Some(e);
            break;
        }
        if exhausted {
            break;
        }
    }

    // Drain in-flight work before returning, success or not.
    while in_flight > 0 {
        match rx.recv() {
            Ok((index, result)) => {
                in_flight -= 1;
                debug!(table, batch = index, "batch parsed");
                absorb(result, &mut reducer, &mut first_error, &cancel);
            }
            Err(_) => break,
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    reducer.stats.unknown_tickers = reducer.warned.len();
    Ok((reducer.merged, reducer.stats))
}
