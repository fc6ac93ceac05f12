//! Raw survey tables and the time-boxed fetch cache in front of them.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info, warn};

use crate::{error::SourceError, io_utils};

/// One snapshot of a survey export: free-text headers plus string cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    lines: Vec<usize>,
    undecodable_cells: usize,
}

impl RawTable {
    /// Rows are taken to follow the header line without gaps.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let lines = (0..rows.len()).map(|idx| idx + 2).collect();
        Self {
            headers,
            rows,
            lines,
            undecodable_cells: 0,
        }
    }

    /// Rows paired with the file line each one starts on.
    pub fn with_lines(headers: Vec<String>, rows: Vec<(usize, Vec<String>)>) -> Self {
        let (lines, rows): (Vec<usize>, Vec<Vec<String>>) = rows.into_iter().unzip();
        Self {
            headers,
            rows,
            lines,
            undecodable_cells: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, label: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == label)
    }

    /// Cells past the end of a short row read as blank.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// 1-based line in the source file where `row` starts.
    pub fn line(&self, row: usize) -> usize {
        self.lines.get(row).copied().unwrap_or(row + 2)
    }

    /// Cells whose bytes were not valid in the input encoding.
    pub fn undecodable_cells(&self) -> usize {
        self.undecodable_cells
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SourceOptions {
    pub delimiter: Option<u8>,
    pub encoding: &'static Encoding,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            encoding: UTF_8,
        }
    }
}

/// Resolves `source_id` (and optional sheet/file name inside it) to a path.
pub fn resolve_path(source_id: &str, sheet: Option<&str>) -> PathBuf {
    match sheet {
        Some(name) => Path::new(source_id).join(name),
        None => PathBuf::from(source_id),
    }
}

pub fn fetch_table(
    source_id: &str,
    sheet: Option<&str>,
    options: &SourceOptions,
) -> Result<RawTable, SourceError> {
    let path = resolve_path(source_id, sheet);
    let label = path.display().to_string();
    if !io_utils::is_dash(&path) && !path.is_file() {
        return Err(SourceError::Unreachable {
            source_id: label,
            reason: "no such file".to_string(),
        });
    }
    let table = read_table(&path, options).map_err(|err| SourceError::Unreadable {
        source_id: label.clone(),
        reason: format!("{err:#}"),
    })?;
    if table.headers.iter().all(|h| h.is_empty()) || table.is_empty() {
        return Err(SourceError::Empty { source_id: label });
    }
    info!(
        "Fetched {} response(s) across {} column(s) from {label}",
        table.len(),
        table.headers.len()
    );
    Ok(table)
}

fn read_table(path: &Path, options: &SourceOptions) -> Result<RawTable> {
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter);
    let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
    let headers = io_utils::reader_headers(&mut reader, options.encoding)?;
    let mut rows = Vec::new();
    let mut undecodable_cells = 0usize;
    for (row_idx, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", row_idx + 2))?;
        let line = record
            .position()
            .map_or(row_idx + 2, |position| position.line() as usize);
        let decoded = io_utils::decode_record(&record, options.encoding);
        if decoded.replaced > 0 {
            warn!(
                "Line {line}: {} cell(s) are not valid {}; undecodable bytes replaced",
                decoded.replaced,
                options.encoding.name()
            );
            undecodable_cells += decoded.replaced;
        }
        if decoded.cells.iter().all(|cell| cell.trim().is_empty()) {
            debug!("Skipping blank line {line}");
            continue;
        }
        rows.push((line, decoded.cells));
    }
    let mut table = RawTable::with_lines(headers, rows);
    table.undecodable_cells = undecodable_cells;
    Ok(table)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceKey {
    pub source_id: String,
    pub sheet: Option<String>,
}

impl SourceKey {
    pub fn new(source_id: &str, sheet: Option<&str>) -> Self {
        Self {
            source_id: source_id.to_string(),
            sheet: sheet.map(str::to_string),
        }
    }
}

struct CachedTable {
    fetched_at: Instant,
    table: Arc<RawTable>,
}

/// Keeps fetched tables for `ttl` so filter changes do not re-read the source.
pub struct TableCache {
    ttl: Duration,
    entries: RwLock<HashMap<SourceKey, CachedTable>>,
}

impl TableCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn get_or_fetch<F>(&self, key: &SourceKey, fetch: F) -> Result<Arc<RawTable>, SourceError>
    where
        F: FnOnce() -> Result<RawTable, SourceError>,
    {
        self.get_or_fetch_at(key, Instant::now(), fetch)
    }

    fn get_or_fetch_at<F>(
        &self,
        key: &SourceKey,
        now: Instant,
        fetch: F,
    ) -> Result<Arc<RawTable>, SourceError>
    where
        F: FnOnce() -> Result<RawTable, SourceError>,
    {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = entries.get(key)
                && now.saturating_duration_since(cached.fetched_at) < self.ttl
            {
                debug!("Serving {:?} from cache", key.source_id);
                return Ok(Arc::clone(&cached.table));
            }
        }
        let table = Arc::new(fetch()?);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            key.clone(),
            CachedTable {
                fetched_at: now,
                table: Arc::clone(&table),
            },
        );
        Ok(table)
    }

    pub fn invalidate(&self, key: &SourceKey) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    fn sample() -> RawTable {
        RawTable::new(
            vec!["학년".to_string(), "팀".to_string()],
            vec![vec!["2".to_string()]],
        )
    }

    #[test]
    fn short_rows_read_blank_cells() {
        let table = sample();
        assert_eq!(table.cell(0, 0), "2");
        assert_eq!(table.cell(0, 1), "");
        assert_eq!(table.cell(5, 0), "");
        assert_eq!(table.column_index("팀"), Some(1));
    }

    #[test]
    fn cache_serves_fresh_entries_and_refetches_stale_ones() {
        let cache = TableCache::new(Duration::from_secs(300));
        let key = SourceKey::new("survey.csv", None);
        let calls = Cell::new(0);
        let fetch = || -> Result<RawTable, SourceError> {
            calls.set(calls.get() + 1);
            Ok(sample())
        };
        let start = Instant::now();

        cache.get_or_fetch_at(&key, start, fetch).unwrap();
        cache
            .get_or_fetch_at(&key, start + Duration::from_secs(10), fetch)
            .unwrap();
        assert_eq!(calls.get(), 1);

        cache
            .get_or_fetch_at(&key, start + Duration::from_secs(301), fetch)
            .unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn cache_is_keyed_by_sheet() {
        let cache = TableCache::new(Duration::from_secs(300));
        cache
            .get_or_fetch(&SourceKey::new("forms", Some("week1.csv")), || Ok(sample()))
            .unwrap();
        cache
            .get_or_fetch(&SourceKey::new("forms", Some("week2.csv")), || Ok(sample()))
            .unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn failed_fetches_are_not_cached() {
        let cache = TableCache::new(Duration::from_secs(300));
        let key = SourceKey::new("missing.csv", None);
        let result = cache.get_or_fetch(&key, || {
            Err(SourceError::Empty {
                source_id: "missing.csv".to_string(),
            })
        });
        assert!(matches!(result, Err(SourceError::Empty { .. })));
        assert!(cache.is_empty());
    }

    #[test]
    fn fetch_reports_unreachable_and_empty_sources() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.csv");
        let err = fetch_table(missing.to_str().unwrap(), None, &SourceOptions::default());
        assert!(matches!(err, Err(SourceError::Unreachable { .. })));

        std::fs::write(dir.path().join("header_only.csv"), "학년,팀\n").unwrap();
        let err = fetch_table(
            dir.path().to_str().unwrap(),
            Some("header_only.csv"),
            &SourceOptions::default(),
        );
        assert!(matches!(err, Err(SourceError::Empty { .. })));
    }

    #[test]
    fn fetch_skips_blank_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        std::fs::write(&path, "학년,팀\n2,A\n,\n3,B\n").unwrap();
        let table = fetch_table(path.to_str().unwrap(), None, &SourceOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(1, 1), "B");
        assert_eq!(table.line(0), 2);
        assert_eq!(table.line(1), 4);
    }

    #[test]
    fn undecodable_bytes_are_replaced_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        let mut bytes = "학년,팀\n2,A\n3,".as_bytes().to_vec();
        bytes.extend_from_slice(&[0xff, b'\n']);
        std::fs::write(&path, bytes).unwrap();

        let table = fetch_table(path.to_str().unwrap(), None, &SourceOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.cell(0, 1), "A");
        assert_eq!(table.cell(1, 0), "3");
        assert_eq!(table.cell(1, 1), "\u{fffd}");
        assert_eq!(table.undecodable_cells(), 1);
    }

    #[test]
    fn quoted_multiline_cells_keep_later_line_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        std::fs::write(&path, "학년,소감\n2,\"첫 줄\n둘째 줄\"\n3,짧음\n").unwrap();
        let table = fetch_table(path.to_str().unwrap(), None, &SourceOptions::default()).unwrap();
        assert_eq!(table.line(0), 2);
        assert_eq!(table.line(1), 4);
    }
}
