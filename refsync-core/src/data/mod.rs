//! Data acquisition: transport, pagination, bulk exports and batch parsing

pub mod batch;
pub mod export;
pub mod http;
pub mod paginate;
pub mod provider;
pub mod transport;

pub use batch::{parse_stream, BatchConfig, Grouped, ParseStats};
pub use export::{BulkExport, CsvStream, ExportArchive, ExportJob, ExportStatus};
pub use http::HttpTransport;
pub use paginate::{Page, RowIterator};
pub use provider::{FetchError, LogProgress, ProgressMonitor};
pub use transport::{Filter, RangeOp, TableQuery, Transport, MAX_PAGE_SIZE};
