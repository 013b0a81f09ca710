//! CSV feed transformer
//!
//! Reads a delimited feed with a header row, validates every data row against
//! a [`FeedSchema`] and reports totals. Rows that fail validation are counted
//! and a bounded sample of them is kept in the summary; structural problems
//! (unreadable file, no header, missing required columns, undecodable data)
//! fail the whole file.

use anyhow::{bail, Context};
use async_trait::async_trait;
use csv::{ReaderBuilder, StringRecord, Trim};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

use super::rules::ColumnRule;
use super::Transformer;
use crate::types::{JobId, PendingFile, ProcessingSummary, Rejection, Totals};

/// Default cap on rejected rows reported per file
pub const DEFAULT_MAX_REJECTIONS: usize = 50;

/// Shape and validation rules for a feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSchema {
    /// Field delimiter
    pub delimiter: char,
    /// Columns that must exist in the header and be non-empty in every row
    pub required_columns: Vec<String>,
    /// Value checks
    pub rules: Vec<ColumnRule>,
    /// Primary key column; duplicates reject the later row
    pub unique_column: Option<String>,
    /// Distinct values of this column are counted as transactions
    pub transaction_column: Option<String>,
    /// First non-empty value classifies the feed
    pub tag_column: Option<String>,
    /// Rejected rows kept in the summary
    pub max_rejections: usize,
}

impl Default for FeedSchema {
    fn default() -> Self {
        Self {
            delimiter: ',',
            required_columns: Vec::new(),
            rules: Vec::new(),
            unique_column: None,
            transaction_column: None,
            tag_column: None,
            max_rejections: DEFAULT_MAX_REJECTIONS,
        }
    }
}

impl FeedSchema {
    /// Every column the schema refers to
    fn referenced_columns(&self) -> impl Iterator<Item = &str> {
        self.required_columns
            .iter()
            .map(String::as_str)
            .chain(self.rules.iter().map(|r| r.column.as_str()))
            .chain(self.unique_column.as_deref())
            .chain(self.transaction_column.as_deref())
            .chain(self.tag_column.as_deref())
    }

    pub fn delimiter_byte(&self) -> anyhow::Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .with_context(|| format!("delimiter '{}' is not a single ASCII character", self.delimiter))
    }
}

/// Column positions resolved against a file's header
struct ResolvedSchema<'a> {
    schema: &'a FeedSchema,
    width: usize,
    required: Vec<(&'a str, usize)>,
    rules: Vec<(&'a ColumnRule, usize)>,
    unique: Option<(&'a str, usize)>,
    transaction: Option<usize>,
    tag: Option<usize>,
}

impl<'a> ResolvedSchema<'a> {
    fn resolve(schema: &'a FeedSchema, headers: &StringRecord) -> anyhow::Result<Self> {
        let position = |column: &str| headers.iter().position(|h| h == column);

        let mut missing: Vec<&str> = Vec::new();
        for column in schema.referenced_columns() {
            if position(column).is_none() && !missing.contains(&column) {
                missing.push(column);
            }
        }
        if !missing.is_empty() {
            bail!("missing columns in header: {}", missing.join(", "));
        }

        // All referenced columns were found above
        let index = |column: &str| position(column).unwrap_or_default();

        Ok(Self {
            schema,
            width: headers.len(),
            required: schema
                .required_columns
                .iter()
                .map(|c| (c.as_str(), index(c)))
                .collect(),
            rules: schema.rules.iter().map(|r| (r, index(&r.column))).collect(),
            unique: schema.unique_column.as_deref().map(|c| (c, index(c))),
            transaction: schema.transaction_column.as_deref().map(index),
            tag: schema.tag_column.as_deref().map(index),
        })
    }
}

/// Running state while scanning a feed
#[derive(Default)]
struct FeedScan {
    raw_lines: u64,
    records_ok: u64,
    seen_keys: HashSet<String>,
    transactions: HashSet<String>,
    tag: Option<String>,
    rejections: Vec<Rejection>,
}

impl FeedScan {
    fn check_row(&mut self, resolved: &ResolvedSchema<'_>, record: &StringRecord) -> Vec<String> {
        if record.len() != resolved.width {
            return vec![format!(
                "Malformed row: expected {} fields, found {}",
                resolved.width,
                record.len()
            )];
        }

        let field = |idx: usize| record.get(idx).unwrap_or_default();
        let mut reasons = Vec::new();

        for (column, idx) in &resolved.required {
            if field(*idx).is_empty() {
                reasons.push(format!("Missing required field: {}", column));
            }
        }

        if let Some((column, idx)) = resolved.unique {
            // A repeated key is recorded even when the row is rejected for another reason
            if !self.seen_keys.insert(field(idx).to_string()) {
                reasons.push(format!("Duplicate {}", column));
            }
        }

        reasons.extend(
            resolved
                .rules
                .iter()
                .filter_map(|(rule, idx)| rule.validate(field(*idx))),
        );

        reasons
    }

    fn accept(&mut self, resolved: &ResolvedSchema<'_>, record: &StringRecord) {
        self.records_ok += 1;

        if let Some(value) = resolved.transaction.and_then(|idx| record.get(idx)) {
            if !value.is_empty() {
                self.transactions.insert(value.to_string());
            }
        }

        if self.tag.is_none() {
            self.tag = resolved
                .tag
                .and_then(|idx| record.get(idx))
                .filter(|v| !v.is_empty())
                .map(str::to_string);
        }
    }

    fn reject(&mut self, max: usize, line: u64, reasons: Vec<String>) {
        if self.rejections.len() < max {
            self.rejections.push(Rejection {
                line,
                reason: reasons.join("; "),
            });
        }
    }

    fn into_summary(self, resolved: &ResolvedSchema<'_>) -> ProcessingSummary {
        let transactions = if resolved.transaction.is_some() {
            self.transactions.len() as u64
        } else {
            self.records_ok
        };

        let summary = ProcessingSummary::ok(Totals {
            raw_lines: self.raw_lines,
            records_ok: self.records_ok,
            transactions: Some(transactions),
        })
        .with_rejections(self.rejections);

        match self.tag {
            Some(tag) => summary.with_tag(tag),
            None => summary,
        }
    }
}

/// Parse and validate one feed file
pub fn scan_feed(path: &Path, schema: &FeedSchema) -> anyhow::Result<ProcessingSummary> {
    let mut reader = ReaderBuilder::new()
        .delimiter(schema.delimiter_byte()?)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("cannot open {}", path.display()))?;

    let headers = reader.headers().context("cannot read header row")?.clone();
    if headers.is_empty() || headers.iter().all(str::is_empty) {
        bail!("missing header row");
    }

    let resolved = ResolvedSchema::resolve(schema, &headers)?;
    let mut scan = FeedScan::default();
    let mut record = StringRecord::new();

    loop {
        match reader.read_record(&mut record) {
            Ok(true) => {},
            Ok(false) => break,
            Err(e) => bail!("undecodable data after {} rows: {}", scan.raw_lines, e),
        }

        scan.raw_lines += 1;
        let line = record.position().map(|p| p.line()).unwrap_or(scan.raw_lines + 1);

        let reasons = scan.check_row(&resolved, &record);
        if reasons.is_empty() {
            scan.accept(&resolved, &record);
        } else {
            debug!(line, reasons = %reasons.join("; "), "Rejected row");
            scan.reject(resolved.schema.max_rejections, line, reasons);
        }
    }

    Ok(scan.into_summary(&resolved))
}

/// Production transformer for delimited feeds
#[derive(Debug, Clone, Default)]
pub struct CsvFeedTransformer {
    schema: FeedSchema,
}

impl CsvFeedTransformer {
    pub fn new(schema: FeedSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeedSchema {
        &self.schema
    }
}

#[async_trait]
impl Transformer for CsvFeedTransformer {
    async fn transform(&self, file: &PendingFile, job_id: &JobId) -> ProcessingSummary {
        info!(file = %file.name, job_id = %job_id, "Importing feed file");

        let path = file.full_path.clone();
        let schema = self.schema.clone();
        let scanned = tokio::task::spawn_blocking(move || scan_feed(&path, &schema)).await;

        match scanned {
            Ok(Ok(summary)) => {
                info!(
                    file = %file.name,
                    job_id = %job_id,
                    raw_lines = summary.totals.raw_lines,
                    records_ok = summary.totals.records_ok,
                    rejected = summary.totals.raw_lines - summary.totals.records_ok,
                    "Feed imported"
                );
                summary
            },
            Ok(Err(e)) => {
                warn!(file = %file.name, job_id = %job_id, error = %format!("{:#}", e), "Feed rejected");
                ProcessingSummary::failed(format!("{:#}", e))
            },
            Err(join_err) => {
                warn!(file = %file.name, job_id = %job_id, error = %join_err, "Feed import task aborted");
                ProcessingSummary::failed(format!("import task aborted: {}", join_err))
            },
        }
    }

    fn name(&self) -> &str {
        "csv_feed"
    }
}
