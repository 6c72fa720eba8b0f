//! refsync core: reference-data ingestion and corporate-action reconciliation.
//!
//! This crate contains:
//! - The raw value/schema model and the per-record decode capability
//! - Domain records (tickers, raw actions, prices, reconciled action records)
//! - A transport seam with a blocking HTTP implementation
//! - Cursor-paginated row iteration and bulk CSV export streaming
//! - A parallel batch parser for bulk exports
//! - Dataset orchestration and the action reconciler
//! - A Parquet persistence sink

pub mod config;
pub mod data;
pub mod dataset;
pub mod decode;
pub mod domain;
pub mod reconcile;
pub mod schema;
pub mod store;

pub use config::{ConfigError, RefsyncConfig};
pub use dataset::{download_all, Dataset, DatasetSummary, RunError, Source};
pub use reconcile::{reconcile_all, reconcile_ticker};
pub use store::{DatasetSink, ParquetStore, StoreError, StoreMeta};
