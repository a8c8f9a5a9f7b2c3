//! Tabular parser and locale views
//!
//! Market sheets are published as TSV. Row 0 groups the locale blocks
//! (Original, Korean, ...), row 1 carries the column headers, and the ranked
//! books start at row 2.

use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Number of reserved header/metadata rows at the top of every table
pub const HEADER_ROWS: usize = 2;

/// Column holding the cover image URL
const IMAGE_COLUMN: usize = 1;

/// Column holding the store link
const LINK_COLUMN: usize = 2;

/// Number of cells in a rendered locale row: image, link and one locale block
pub const VIEW_WIDTH: usize = 7;

/// Row and column layout a market sheet is expected to follow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSchema {
    /// Index of the first data row
    pub data_row_offset: usize,
    /// Column where locale block 0 starts
    pub locale_block_start: usize,
    /// Number of columns in each locale block
    pub locale_block_width: usize,
}

impl Default for TableSchema {
    fn default() -> Self {
        Self {
            data_row_offset: HEADER_ROWS,
            locale_block_start: 3,
            locale_block_width: 5,
        }
    }
}

/// Immutable rows of string cells for one market
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

/// Column-sliced projection of a table for one language block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocaleView {
    /// Image, link, title, author, author info, about, more info
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table from already split rows
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    /// Parses a TSV payload against the given schema
    ///
    /// The whole payload is trimmed, split into lines on `\n`, cells split on
    /// `\t` and trimmed individually. A payload that does not reach the first
    /// data row is rejected as a `ParseFailure`.
    pub fn parse_tsv(text: &str, schema: &TableSchema) -> Result<Self, CacheError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CacheError::ParseFailure("empty payload".to_string()));
        }

        let rows: Vec<Vec<String>> = trimmed
            .split('\n')
            .map(|line| line.split('\t').map(|cell| cell.trim().to_string()).collect())
            .collect();

        if rows.len() < schema.data_row_offset {
            return Err(CacheError::ParseFailure(format!(
                "expected at least {} header rows, got {}",
                schema.data_row_offset,
                rows.len()
            )));
        }

        Ok(Self { rows })
    }

    /// All rows including the header rows
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// The column header row (row 1), if present
    pub fn header_row(&self) -> Option<&[String]> {
        self.rows.get(HEADER_ROWS - 1).map(Vec::as_slice)
    }

    /// Rows after the reserved header rows
    pub fn data_rows(&self) -> &[Vec<String>] {
        self.rows.get(HEADER_ROWS..).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Computes the view of one locale block
    ///
    /// Each output row is `[image, link, block cells...]`, padded with empty
    /// strings to the block width. Missing cells never fail.
    ///
    /// # Arguments
    /// * `block` - Language block index, 0 for the original titles
    /// * `schema` - Column layout of the table
    ///
    /// # Returns
    /// A view with one projected row per data row. A block past the end of
    /// the columns, including one too large to address, yields empty cells.
    pub fn locale_view(&self, block: usize, schema: &TableSchema) -> LocaleView {
        let start = block
            .checked_mul(schema.locale_block_width)
            .and_then(|offset| offset.checked_add(schema.locale_block_start));

        let headers = self
            .rows
            .get(schema.data_row_offset.saturating_sub(1))
            .map(|row| project_row(row, start, schema.locale_block_width))
            .unwrap_or_else(|| vec![String::new(); 2 + schema.locale_block_width]);

        let rows = self
            .rows
            .get(schema.data_row_offset..)
            .unwrap_or(&[])
            .iter()
            .map(|row| project_row(row, start, schema.locale_block_width))
            .collect();

        LocaleView { headers, rows }
    }
}

fn project_row(row: &[String], start: Option<usize>, width: usize) -> Vec<String> {
    let cell = |i: usize| row.get(i).cloned().unwrap_or_default();

    let mut projected = Vec::with_capacity(2 + width);
    projected.push(cell(IMAGE_COLUMN));
    projected.push(cell(LINK_COLUMN));
    match start.and_then(|s| s.checked_add(width).map(|end| s..end)) {
        Some(columns) => projected.extend(columns.map(cell)),
        None => projected.resize(2 + width, String::new()),
    }
    projected
}
