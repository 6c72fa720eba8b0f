//! Lazy, cursor-following iterator over a filtered datatable query.
//!
//! Each page is one request. Rows are decoded on demand; when a page is
//! exhausted and the response carried a cursor, the next call to `next()`
//! transparently requests the following page.

use super::provider::FetchError;
use super::transport::{TableQuery, Transport};
use crate::decode::Decode;
use crate::schema::{RawValue, Schema};
use serde::Deserialize;
use std::marker::PhantomData;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PageResponse {
    datatable: PageTable,
    #[serde(default)]
    meta: PageMeta,
}

#[derive(Debug, Deserialize)]
struct PageTable {
    data: Vec<Vec<RawValue>>,
    columns: Schema,
}

#[derive(Debug, Default, Deserialize)]
struct PageMeta {
    next_cursor_id: Option<String>,
}

/// One decoded page: its schema, rows and continuation cursor.
#[derive(Debug)]
pub struct Page {
    pub schema: Schema,
    pub rows: Vec<Vec<RawValue>>,
    pub next_cursor: Option<String>,
}

impl Page {
    /// Parse a datatable JSON body.
    pub fn parse(body: &str) -> Result<Self, FetchError> {
        let resp: PageResponse = serde_json::from_str(body)
            .map_err(|e| FetchError::ResponseFormat(format!("datatable page: {e}")))?;
        Ok(Page {
            schema: resp.datatable.columns,
            rows: resp.datatable.data,
            next_cursor: resp.meta.next_cursor_id.filter(|c| !c.is_empty()),
        })
    }
}

enum Cursor {
    /// No page requested yet.
    Start,
    /// More pages behind this cursor.
    Next(String),
    /// Last page consumed, or a failure was reported.
    Done,
}

/// Iterator over the decoded rows of every page of a query.
///
/// The first error (transport, schema mismatch or decode) is yielded once and
/// ends the iteration; collecting into `Result<Vec<T>, _>` therefore never
/// produces partial results.
pub struct RowIterator<'t, T> {
    transport: &'t dyn Transport,
    query: TableQuery,
    expected: Schema,
    schema: Schema,
    rows: std::vec::IntoIter<Vec<RawValue>>,
    cursor: Cursor,
    pages: usize,
    row_index: usize,
    _record: PhantomData<T>,
}

impl<'t, T: Decode> RowIterator<'t, T> {
    pub fn new(transport: &'t dyn Transport, query: TableQuery) -> Self {
        Self {
            transport,
            query,
            expected: T::schema(),
            schema: Schema::default(),
            rows: Vec::new().into_iter(),
            cursor: Cursor::Start,
            pages: 0,
            row_index: 0,
            _record: PhantomData,
        }
    }

    /// Pages fetched so far.
    pub fn pages(&self) -> usize {
        self.pages
    }

    fn fetch_page(&mut self, cursor: Option<&str>) -> Result<(), FetchError> {
        let body = self
            .transport
            .get(&self.query.path(), &self.query.page_params(cursor))?;
        let page = Page::parse(&body)?;

        if !self.expected.is_subset_of(&page.schema) {
            return Err(FetchError::SchemaMismatch {
                table: self.query.table.clone(),
                missing: self.expected.missing_from(&page.schema),
            });
        }

        self.pages += 1;
        debug!(
            table = %self.query.table,
            page = self.pages,
            rows = page.rows.len(),
            more = page.next_cursor.is_some(),
            "fetched page"
        );

        self.schema = page.schema;
        self.rows = page.rows.into_iter();
        self.cursor = match page.next_cursor {
            Some(c) => Cursor::Next(c),
            None => Cursor::Done,
        };
        Ok(())
    }
}

impl<'t, T: Decode> Iterator for RowIterator<'t, T> {
    type Item = Result<T, FetchError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(values) = self.rows.next() {
                let index = self.row_index;
                self.row_index += 1;
                let decoded = T::decode(&values, &self.schema).map_err(|e| {
                    FetchError::decode(format!("{} row {index}", self.query.table), e)
                });
                if decoded.is_err() {
                    self.cursor = Cursor::Done;
                    self.rows = Vec::new().into_iter();
                }
                return Some(decoded);
            }

            let cursor = match std::mem::replace(&mut self.cursor, Cursor::Done) {
                Cursor::Done => return None,
                Cursor::Start => None,
                Cursor::Next(c) => Some(c),
            };

            if let Err(e) = self.fetch_page(cursor.as_deref()) {
                self.cursor = Cursor::Done;
                return Some(Err(e));
            }
        }
    }
}
