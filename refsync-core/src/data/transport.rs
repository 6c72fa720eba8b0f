//! Transport seam and datatable query construction.
//!
//! The [`Transport`] trait abstracts the HTTP plumbing (base URL, authentication,
//! retries) so the row iterator and bulk export stream can run against an
//! in-memory fake in tests.

use super::provider::FetchError;
use std::io::Write;

/// Upstream cap on rows per response.
pub const MAX_PAGE_SIZE: usize = 10_000;

/// Raw request/response plumbing for the table API.
pub trait Transport: Send + Sync {
    /// Perform a GET on `path` with query `params`, returning the JSON body.
    fn get(&self, path: &str, params: &[(String, String)]) -> Result<String, FetchError>;

    /// Stream the resource behind `link` into `dest`, returning the byte count.
    fn download(&self, link: &str, dest: &mut dyn Write) -> Result<u64, FetchError>;
}

/// Comparison operator of a range filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    Lt,
    Gt,
    Le,
    Ge,
}

impl RangeOp {
    /// Suffix appended to the column name in the query string.
    pub fn suffix(&self) -> &'static str {
        match self {
            RangeOp::Lt => "lt",
            RangeOp::Gt => "gt",
            RangeOp::Le => "lte",
            RangeOp::Ge => "gte",
        }
    }
}

/// Row filter of a table query.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals any of the values.
    In { column: String, values: Vec<String> },
    /// Column compared against a single value.
    Range {
        column: String,
        op: RangeOp,
        value: String,
    },
}

impl Filter {
    pub fn is_in<S: AsRef<str>>(column: &str, values: &[S]) -> Self {
        Filter::In {
            column: column.to_string(),
            values: values.iter().map(|v| v.as_ref().to_string()).collect(),
        }
    }

    pub fn range(column: &str, op: RangeOp, value: impl Into<String>) -> Self {
        Filter::Range {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }

    fn param(&self) -> (String, String) {
        match self {
            Filter::In { column, values } => (column.clone(), values.join(",")),
            Filter::Range { column, op, value } => {
                (format!("{column}.{}", op.suffix()), value.clone())
            }
        }
    }
}

/// A filtered, projected query against one datatable.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    /// Fully qualified table, e.g. `SHARADAR/TICKERS`.
    pub table: String,
    pub filters: Vec<Filter>,
    pub columns: Vec<String>,
    pub per_page: usize,
}

impl TableQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filters: Vec::new(),
            columns: Vec::new(),
            per_page: MAX_PAGE_SIZE,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn columns<S: AsRef<str>>(mut self, columns: &[S]) -> Self {
        self.columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        self
    }

    /// Page size, clamped to `1..=MAX_PAGE_SIZE`.
    pub fn per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Request path of the table's JSON endpoint.
    pub fn path(&self) -> String {
        format!("datatables/{}.json", self.table)
    }

    /// Query parameters for one page.
    pub fn page_params(&self, cursor: Option<&str>) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self.filters.iter().map(Filter::param).collect();
        if !self.columns.is_empty() {
            params.push(("qopts.columns".into(), self.columns.join(",")));
        }
        params.push(("qopts.per_page".into(), self.per_page.to_string()));
        if let Some(cursor) = cursor {
            params.push(("qopts.cursor_id".into(), cursor.to_string()));
        }
        params
    }

    /// Query parameters for a bulk export request.
    pub fn export_params(&self) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = self.filters.iter().map(Filter::param).collect();
        if !self.columns.is_empty() {
            params.push(("qopts.columns".into(), self.columns.join(",")));
        }
        params.push(("qopts.export".into(), "true".into()));
        params
    }
}
