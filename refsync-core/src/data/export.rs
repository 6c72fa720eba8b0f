//! Bulk export stream.
//!
//! Flow: request an export job → check its status → download the archive into
//! an anonymous temp file → require exactly one zip entry → read that entry as
//! CSV, one row at a time.
//!
//! The temp file and archive handle are owned by [`ExportArchive`] and released
//! when it is dropped, on every exit path.

use super::provider::{FetchError, ProgressMonitor};
use super::transport::{TableQuery, Transport};
use csv::{Reader, ReaderBuilder, StringRecord};
use serde::Deserialize;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, info};
use zip::ZipArchive;

/// Readiness of a bulk export job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportStatus {
    Creating,
    Regenerating,
    Fresh,
}

impl ExportStatus {
    /// Whether the archive behind the link can be streamed.
    pub fn is_ready(&self) -> bool {
        matches!(self, ExportStatus::Fresh | ExportStatus::Regenerating)
    }
}

impl fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExportStatus::Creating => "creating",
            ExportStatus::Regenerating => "regenerating",
            ExportStatus::Fresh => "fresh",
        })
    }
}

#[derive(Debug, Deserialize)]
struct ExportResponse {
    datatable_bulk_download: ExportBody,
}

#[derive(Debug, Deserialize)]
struct ExportBody {
    file: ExportFile,
    #[serde(default)]
    datatable: Option<ExportTable>,
}

#[derive(Debug, Deserialize)]
struct ExportFile {
    status: ExportStatus,
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    data_snapshot_time: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportTable {
    #[serde(default)]
    last_refreshed_time: Option<String>,
}

/// State of an export job as reported by the API.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub status: ExportStatus,
    pub link: Option<String>,
    pub snapshot_time: Option<String>,
    pub last_refreshed_time: Option<String>,
}

impl ExportJob {
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let resp: ExportResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::ResponseFormat(format!("bulk export job: {e}")))?;
        let body = resp.datatable_bulk_download;
        Ok(ExportJob {
            status: body.file.status,
            link: body.file.link.filter(|l| !l.is_empty()),
            snapshot_time: body.file.data_snapshot_time,
            last_refreshed_time: body.datatable.and_then(|t| t.last_refreshed_time),
        })
    }
}

/// A bulk export of one table.
pub struct BulkExport<'t> {
    transport: &'t dyn Transport,
    query: TableQuery,
    progress: Option<Arc<dyn ProgressMonitor>>,
    progress_interval: u64,
}

impl<'t> BulkExport<'t> {
    pub fn new(transport: &'t dyn Transport, query: TableQuery) -> Self {
        Self {
            transport,
            query,
            progress: None,
            progress_interval: 0,
        }
    }

    /// Report cumulative bytes read every `interval` bytes. An interval of 0
    /// disables reporting.
    pub fn with_progress(mut self, monitor: Arc<dyn ProgressMonitor>, interval: u64) -> Self {
        self.progress = Some(monitor);
        self.progress_interval = interval;
        self
    }

    pub fn table(&self) -> &str {
        &self.query.table
    }

    /// Request (or poll) the export job.
    pub fn request(&self) -> Result<ExportJob, FetchError> {
        let body = self
            .transport
            .get(&self.query.path(), &self.query.export_params())?;
        let job = ExportJob::parse(&body)?;
        info!(
            table = %self.query.table,
            status = %job.status,
            snapshot = job.snapshot_time.as_deref().unwrap_or("-"),
            "bulk export job"
        );
        Ok(job)
    }

    /// Request the export, download its archive and open it.
    pub fn open(&self) -> Result<ExportArchive, FetchError> {
        let job = self.request()?;
        if !job.status.is_ready() {
            return Err(self.not_available(job.status));
        }
        let link = job.link.ok_or_else(|| self.not_available(job.status))?;

        let mut file = tempfile::tempfile()?;
        let bytes = self.transport.download(&link, &mut file)?;
        file.seek(SeekFrom::Start(0))?;
        debug!(table = %self.query.table, bytes, "archive stored");

        let mut archive = ExportArchive::new(file)?;
        archive.table = self.query.table.clone();
        if let Some(monitor) = &self.progress {
            archive.progress = Some((Arc::clone(monitor), self.progress_interval));
        }
        Ok(archive)
    }

    fn not_available(&self, status: ExportStatus) -> FetchError {
        FetchError::ExportNotAvailable {
            table: self.query.table.clone(),
            status: status.to_string(),
        }
    }
}

/// An opened single-entry export archive.
pub struct ExportArchive<R = File> {
    archive: ZipArchive<R>,
    table: String,
    progress: Option<(Arc<dyn ProgressMonitor>, u64)>,
}

impl<R: Read + Seek> ExportArchive<R> {
    /// Open an archive, requiring exactly one entry.
    pub fn new(reader: R) -> Result<Self, FetchError> {
        let archive = ZipArchive::new(reader)?;
        if archive.len() != 1 {
            return Err(FetchError::ArchiveEntries {
                count: archive.len(),
            });
        }
        Ok(Self {
            archive,
            table: String::new(),
            progress: None,
        })
    }

    /// Name of the single entry.
    pub fn entry_name(&self) -> Option<&str> {
        self.archive.file_names().next()
    }

    /// Open the entry as a row-oriented CSV stream.
    pub fn csv(&mut self) -> Result<CsvStream<impl Read + '_>, FetchError> {
        let entry = self.archive.by_index(0)?;
        let reader = ProgressReader {
            inner: entry,
            table: self.table.clone(),
            bytes_read: 0,
            next_report: self.progress.as_ref().map_or(0, |(_, interval)| *interval),
            monitor: self.progress.clone().filter(|(_, interval)| *interval > 0),
        };
        CsvStream::new(reader)
    }
}

/// Byte-counting reader that invokes a monitor every `interval` bytes.
struct ProgressReader<R> {
    inner: R,
    table: String,
    bytes_read: u64,
    next_report: u64,
    monitor: Option<(Arc<dyn ProgressMonitor>, u64)>,
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read += n as u64;
        if let Some((monitor, interval)) = &self.monitor {
            if self.bytes_read >= self.next_report {
                monitor.on_progress(&self.table, self.bytes_read);
                while self.next_report <= self.bytes_read {
                    self.next_report += interval;
                }
            }
        }
        Ok(n)
    }
}

/// Lazily read CSV rows.
pub struct CsvStream<R: Read> {
    reader: Reader<R>,
    header: StringRecord,
}

impl<R: Read> CsvStream<R> {
    pub fn new(inner: R) -> Result<Self, FetchError> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(false)
            .from_reader(inner);
        let header = reader.headers()?.clone();
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> &StringRecord {
        &self.header
    }

    /// Next row, or `None` at end of stream.
    pub fn read(&mut self) -> Result<Option<StringRecord>, FetchError> {
        let mut record = StringRecord::new();
        if self.reader.read_record(&mut record)? {
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }
}
