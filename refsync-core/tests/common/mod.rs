//! In-memory transport and fixture builders shared by the integration tests.

#![allow(dead_code)]

use refsync_core::data::{FetchError, Transport};
use refsync_core::schema::Schema;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::Mutex;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Serves canned datatable pages, export jobs and archives.
///
/// Pages of a table are addressed by cursor: the first request (no cursor)
/// gets page 0, cursor `"c{n}"` gets page n.
#[derive(Default)]
pub struct FakeTransport {
    pages: HashMap<String, Vec<String>>,
    exports: HashMap<String, String>,
    archives: HashMap<String, Vec<u8>>,
    pub requests: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the pages of `table` (e.g. `SHARADAR/TICKERS`). Each page but
    /// the last gets a cursor to the next one.
    pub fn with_pages(mut self, table: &str, schema: &Schema, pages: Vec<Vec<Vec<Value>>>) -> Self {
        let count = pages.len();
        let bodies = pages
            .into_iter()
            .enumerate()
            .map(|(i, rows)| {
                let next = (i + 1 < count).then(|| format!("c{}", i + 1));
                page_body(schema, rows, next.as_deref())
            })
            .collect();
        self.pages.insert(path(table), bodies);
        self
    }

    /// Register a raw page body list for `table`.
    pub fn with_raw_pages(mut self, table: &str, bodies: Vec<String>) -> Self {
        self.pages.insert(path(table), bodies);
        self
    }

    /// Register an export job for `table` with the given status, serving
    /// `archive` behind its link.
    pub fn with_export(mut self, table: &str, status: &str, archive: Vec<u8>) -> Self {
        let link = format!("https://exports.test/{}.zip", table.replace('/', "_"));
        self.exports.insert(path(table), export_body(status, &link));
        self.archives.insert(link, archive);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for FakeTransport {
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<String, FetchError> {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), params.to_vec()));

        let is_export = params.iter().any(|(k, v)| k == "qopts.export" && v == "true");
        if is_export {
            return self.exports.get(path).cloned().ok_or(FetchError::Status {
                status: 404,
                path: path.to_string(),
                body: "no export".into(),
            });
        }

        let index = params
            .iter()
            .find(|(k, _)| k == "qopts.cursor_id")
            .and_then(|(_, v)| v.trim_start_matches('c').parse::<usize>().ok())
            .unwrap_or(0);
        self.pages
            .get(path)
            .and_then(|pages| pages.get(index))
            .cloned()
            .ok_or(FetchError::Status {
                status: 404,
                path: path.to_string(),
                body: format!("no page {index}"),
            })
    }

    fn download(&self, link: &str, dest: &mut dyn Write) -> Result<u64, FetchError> {
        let bytes = self
            .archives
            .get(link)
            .ok_or_else(|| FetchError::Network(format!("unknown link {link}")))?;
        dest.write_all(bytes)?;
        Ok(bytes.len() as u64)
    }
}

pub fn path(table: &str) -> String {
    format!("datatables/{table}.json")
}

pub fn page_body(schema: &Schema, rows: Vec<Vec<Value>>, next: Option<&str>) -> String {
    let columns: Vec<Value> = schema
        .fields()
        .iter()
        .map(|f| json!({"name": f.name, "type": f.type_tag}))
        .collect();
    json!({
        "datatable": {"data": rows, "columns": columns},
        "meta": {"next_cursor_id": next},
    })
    .to_string()
}

pub fn export_body(status: &str, link: &str) -> String {
    json!({
        "datatable_bulk_download": {
            "file": {"link": link, "status": status, "data_snapshot_time": "2024-03-01 04:00:00 UTC"},
            "datatable": {"last_refreshed_time": "2024-03-01 03:00:00 UTC"},
        }
    })
    .to_string()
}

/// A zip archive with the given `(name, content)` entries.
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub const PRICE_HEADER: &str =
    "ticker,date,open,high,low,close,volume,closeadj,closeunadj,lastupdated";

/// Price CSV with one line per `(ticker, date, close)`.
pub fn price_csv(rows: &[(&str, &str, f64)]) -> String {
    let mut out = format!("{PRICE_HEADER}\n");
    for (ticker, date, close) in rows {
        out.push_str(&format!(
            "{ticker},{date},{close},{close},{close},{close},1000,{close},{close},{date}\n"
        ));
    }
    out
}

/// Row in `Ticker::schema()` order.
pub fn ticker_row(table: &str, symbol: &str, delisted: bool) -> Vec<Value> {
    vec![
        json!(table),
        json!(100_000 + symbol.len() as i64),
        json!(symbol),
        json!(format!("{symbol} Corp")),
        json!("NYSE"),
        json!(if delisted { "Y" } else { "N" }),
        json!("Domestic Common Stock"),
        json!("Technology"),
        Value::Null,
        json!("4 - Mid"),
        json!("3 - Small"),
        json!("USD"),
        json!("California; U.S.A"),
        json!("2024-03-01"),
        json!("2024-03-05"),
        json!("2024-03-06"),
    ]
}

/// Row in `RawAction::schema()` order.
pub fn action_row(date: &str, action: &str, symbol: &str, value: f64) -> Vec<Value> {
    vec![
        json!(date),
        json!(action),
        json!(symbol),
        json!(format!("{symbol} Corp")),
        json!(value),
        Value::Null,
        Value::Null,
    ]
}
