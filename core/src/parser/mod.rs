//! Resilient CSV ingestion with encoding and delimiter auto-detection.
//!
//! Turns a delimited text source of unknown encoding and delimiter into a
//! [`NormalizedTable`]:
//!
//! 1. strip a byte-order mark and decode (UTF-8, then a detected legacy charset)
//! 2. infer the delimiter from the most consistent field count
//! 3. extract and disambiguate headers
//! 4. type every column, parsing `MONTH` through a date cascade
//! 5. sort rows by month, nulls last
//!
//! Degraded conditions (unparseable months, a dropped `MONTH` column) are
//! reported as notices next to the table rather than as errors.

pub mod dates;
mod values;

pub use dates::parse_timestamp;
pub use values::{clean_cell, parse_number, NULL_TOKENS};

use encoding_rs::Encoding;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::models::{NamedColumn, NormalizedTable, SourceInfo, MONTH};
use crate::notices::{Notice, NoticeKind};

/// Delimiters tried during inference, in tie-break order.
pub const CANDIDATE_DELIMITERS: [char; 3] = [',', ';', '\t'];

/// Minimum number of sampled rows that must agree on a field count.
pub const MIN_AGREEING_ROWS: usize = 2;

/// Column names typed as categories unless configured otherwise.
pub const DEFAULT_CATEGORY_COLUMNS: &[&str] =
    &["CATEGORY", "COHORT", "PLATFORM", "USER_TYPE", "ACTIVITY_LEVEL", "SECTOR", "CHAIN"];

/// Ingestion settings
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Number of records sampled for delimiter inference
    pub sample_rows: usize,
    /// Column names typed as category labels
    pub category_columns: Vec<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            sample_rows: 50,
            category_columns: DEFAULT_CATEGORY_COLUMNS.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Text recovered from raw bytes
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: String,
    pub had_bom: bool,
}

/// Field-count consistency of one delimiter candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterScore {
    pub delimiter: char,
    /// Most common field count across sampled rows
    pub columns: usize,
    /// Rows whose field count equals `columns`
    pub agreeing_rows: usize,
    pub sampled_rows: usize,
}

/// A parsed table with what was detected and any degraded-mode notices.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub table: NormalizedTable,
    pub source: SourceInfo,
    pub notices: Vec<Notice>,
}

// =============================================================================
// Encoding
// =============================================================================

fn normalize_charset(charset: &str) -> String {
    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-15".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Detect and strip a byte-order mark, then decode the bytes as text.
///
/// Without a BOM, strict UTF-8 is tried first and a `chardet` guess second.
pub fn decode_content(bytes: &[u8]) -> IngestionResult<DecodedText> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, had_errors) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        if had_errors {
            return Err(IngestionError::EncodingUnrecognized(format!(
                "invalid {} after byte-order mark",
                encoding.name()
            )));
        }
        return finish_decode(text.into_owned(), encoding.name(), true);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return finish_decode(text.to_string(), "UTF-8", false);
    }

    let guessed = normalize_charset(&chardet::detect(bytes).0);
    if guessed == "utf-8" {
        return Err(IngestionError::EncodingUnrecognized("invalid UTF-8".to_string()));
    }
    decode_as(bytes, &guessed)
}

/// Decode BOM-less bytes with an explicit charset label.
pub fn decode_as(bytes: &[u8], charset: &str) -> IngestionResult<DecodedText> {
    let label = normalize_charset(charset);
    let encoding = Encoding::for_label(label.as_bytes())
        .ok_or_else(|| IngestionError::EncodingUnrecognized(label.clone()))?;
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(IngestionError::EncodingUnrecognized(label));
    }
    finish_decode(text.into_owned(), encoding.name(), false)
}

fn finish_decode(text: String, encoding: &str, had_bom: bool) -> IngestionResult<DecodedText> {
    if text.contains('\0') {
        return Err(IngestionError::EncodingUnrecognized(format!("binary content ({})", encoding)));
    }
    Ok(DecodedText {
        text: text.trim_start_matches('\u{feff}').to_string(),
        encoding: encoding.to_string(),
        had_bom,
    })
}

// =============================================================================
// Delimiter inference
// =============================================================================

fn reader_for(content: &str, delimiter: char) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes())
}

fn is_blank(record: &csv::StringRecord) -> bool {
    record.iter().all(|f| f.trim().is_empty())
}

/// Score one delimiter: the mode of per-row field counts and how many rows agree with it.
pub fn score_delimiter(content: &str, delimiter: char, sample_rows: usize) -> DelimiterScore {
    let counts: Vec<usize> = reader_for(content, delimiter)
        .records()
        .filter_map(Result::ok)
        .filter(|r| !is_blank(r))
        .take(sample_rows)
        .map(|r| r.len())
        .collect();

    let mut frequency: HashMap<usize, usize> = HashMap::new();
    for &count in &counts {
        *frequency.entry(count).or_default() += 1;
    }

    // Ties on frequency go to the wider row shape.
    let (columns, agreeing_rows) = frequency
        .into_iter()
        .max_by_key(|&(cols, freq)| (freq, cols))
        .unwrap_or((0, 0));

    DelimiterScore {
        delimiter,
        columns,
        agreeing_rows,
        sampled_rows: counts.len(),
    }
}

/// Pick the delimiter producing the most consistent column count.
///
/// Candidates need at least [`MIN_AGREEING_ROWS`] agreeing rows. Among those,
/// multi-column shapes win, then more agreeing rows, then more columns, then
/// candidate order.
pub fn detect_delimiter(content: &str, sample_rows: usize) -> IngestionResult<DelimiterScore> {
    let scores: Vec<DelimiterScore> = CANDIDATE_DELIMITERS
        .iter()
        .map(|&d| score_delimiter(content, d, sample_rows))
        .collect();
    let sampled_rows = scores.iter().map(|s| s.sampled_rows).max().unwrap_or(0);

    let mut best: Option<DelimiterScore> = None;
    for score in scores.into_iter().filter(|s| s.agreeing_rows >= MIN_AGREEING_ROWS) {
        let key = |s: &DelimiterScore| (s.columns > 1, s.agreeing_rows, s.columns);
        match best {
            Some(current) if key(&current) >= key(&score) => {}
            _ => best = Some(score),
        }
    }

    best.ok_or(IngestionError::DelimiterAmbiguous { sampled_rows })
}

// =============================================================================
// Headers
// =============================================================================

/// Trim names, canonicalize `month`, name blanks, and suffix duplicates.
pub fn disambiguate_headers(raw: &[String]) -> Vec<String> {
    let base: Vec<String> = raw
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let name = name.trim().trim_start_matches('\u{feff}').trim();
            if name.is_empty() {
                format!("UNNAMED_{}", i)
            } else if name.eq_ignore_ascii_case(MONTH) {
                MONTH.to_string()
            } else {
                name.to_string()
            }
        })
        .collect();

    let originals: HashSet<&str> = base.iter().map(String::as_str).collect();
    let mut taken: HashSet<String> = HashSet::new();
    let mut headers = Vec::with_capacity(base.len());

    for name in &base {
        if taken.insert(name.clone()) {
            headers.push(name.clone());
            continue;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", name, n);
            if !originals.contains(candidate.as_str()) && taken.insert(candidate.clone()) {
                headers.push(candidate);
                break;
            }
            n += 1;
        }
    }

    headers
}

// =============================================================================
// Ingestion
// =============================================================================

/// Parse a table from a file with auto-detection of encoding and delimiter.
pub fn ingest_file<P: AsRef<Path>>(path: P, options: &IngestOptions) -> IngestionResult<Ingested> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| IngestionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = bytes.len(), "read dataset");
    ingest_bytes(&bytes, options)
}

/// Parse a table from raw bytes with auto-detection of encoding and delimiter.
///
/// Delimiter detection needs at least two records of the same shape, so a
/// header-only file fails with [`IngestionError::DelimiterAmbiguous`].
pub fn ingest_bytes(bytes: &[u8], options: &IngestOptions) -> IngestionResult<Ingested> {
    let decoded = decode_content(bytes)?;
    if decoded.text.trim().is_empty() {
        return Err(IngestionError::HeaderMissing);
    }

    let score = detect_delimiter(&decoded.text, options.sample_rows.max(MIN_AGREEING_ROWS))?;
    debug!(
        encoding = %decoded.encoding,
        delimiter = ?score.delimiter,
        columns = score.columns,
        agreeing = score.agreeing_rows,
        "detected source format"
    );

    let mut records = reader_for(&decoded.text, score.delimiter).into_records();
    let header_record = loop {
        match records.next() {
            Some(record) => {
                let record = record?;
                if !is_blank(&record) {
                    break record;
                }
            }
            None => return Err(IngestionError::HeaderMissing),
        }
    };
    let raw_headers: Vec<String> = header_record.iter().map(str::to_string).collect();
    let headers = disambiguate_headers(&raw_headers);

    // Column-major raw cells; short rows padded, long rows truncated.
    let mut raw_columns: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in records {
        let record = record?;
        if is_blank(&record) {
            continue;
        }
        for (i, cells) in raw_columns.iter_mut().enumerate() {
            cells.push(record.get(i).map(str::to_string));
        }
    }
    let row_count = raw_columns.first().map_or(0, Vec::len);

    let mut notices = Vec::new();
    let mut columns = Vec::with_capacity(headers.len());
    for (name, raw) in headers.iter().zip(&raw_columns) {
        let typed = values::type_column(name, raw, &options.category_columns);
        if typed.unparseable > 0 {
            notices.push(Notice::info(
                NoticeKind::UnparseableValues,
                format!("{} value(s) in column '{}' could not be parsed and were treated as null", typed.unparseable, name),
            ));
        }
        columns.push(NamedColumn {
            name: name.clone(),
            column: typed.column,
        });
    }

    let mut table = NormalizedTable::new(columns)?;

    if let Some(months) = table.months() {
        if row_count > 0 && months.iter().all(Option::is_none) {
            notices.push(Notice::warning(
                NoticeKind::UnparseableMonthColumn,
                "No MONTH value could be parsed as a date; the column was dropped",
            ));
            table = table.without_column(MONTH);
        } else {
            let mut order: Vec<usize> = (0..row_count).collect();
            order.sort_by_key(|&i| (months[i].is_none(), months[i]));
            table = table.permuted(&order);
        }
    }

    let source = SourceInfo {
        encoding: decoded.encoding,
        had_bom: decoded.had_bom,
        delimiter: score.delimiter,
        headers,
        row_count,
    };

    Ok(Ingested { table, source, notices })
}
