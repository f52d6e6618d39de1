use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::Value;

use crate::cli::ExportArgs;
use crate::flatten::flatten_all;
use crate::formats::FlatRow;
use crate::xlsx::{Cell, Sheet, Workbook};

pub const DEFAULT_CHUNK_SIZE: usize = 10_000;
pub const TOP_COMPANIES_LIMIT: usize = 50;
const WORKBOOK_EXTENSION: &str = "xlsx";

const SHEET_JOBS_DATA: &str = "Jobs Data";
const SHEET_SUMMARY: &str = "Summary";
const SHEET_OVERALL_SUMMARY: &str = "Overall Summary";
const SHEET_TOP_COMPANIES: &str = "Top Companies";
const SHEET_FILE_BREAKDOWN: &str = "File Breakdown";

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("JSON file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("read JSON file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON format in {}", .path.display())]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected a JSON array of jobs in {}", .0.display())]
    NotAnArray(PathBuf),

    #[error("no job data found in {}", .0.display())]
    EmptyInput(PathBuf),

    #[error("none of the {total} jobs in {} could be processed", .path.display())]
    NoUsableRecords { path: PathBuf, total: usize },

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("write workbook {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub input: PathBuf,
    pub prefix: String,
    pub chunk_size: usize,
}

impl ExportOptions {
    pub fn new(input: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            prefix: prefix.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    fn from_args(args: ExportArgs) -> Self {
        let input = if args.input.ends_with(".json") {
            args.input
        } else {
            format!("{}.json", args.input)
        };
        let prefix = args
            .prefix
            .unwrap_or_else(|| default_prefix(Path::new(&input)));
        Self {
            input: PathBuf::from(input),
            prefix,
            chunk_size: args.chunk_size,
        }
    }
}

/// Output prefix derived from an input path: `.json` and `_jobs` are dropped
/// from the file name, so `out/data_scientist_jobs.json` → `out/data_scientist`.
pub fn default_prefix(input: &Path) -> String {
    let file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = file_name
        .strip_suffix(".json")
        .unwrap_or(&file_name)
        .replace("_jobs", "");
    match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.join(stem).to_string_lossy().into_owned()
        }
        _ => stem,
    }
}

/// A contiguous slice `[start, end)` of the flattened rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl ChunkSpan {
    pub fn rows(&self) -> usize {
        self.end - self.start
    }

    pub fn part_number(&self) -> usize {
        self.index + 1
    }
}

pub fn plan_chunks(total_rows: usize, chunk_size: usize) -> Vec<ChunkSpan> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (0..total_rows)
        .step_by(chunk_size)
        .enumerate()
        .map(|(index, start)| ChunkSpan {
            index,
            start,
            end: (start + chunk_size).min(total_rows),
        })
        .collect()
}

pub fn part_path(prefix: &str, part_number: usize) -> PathBuf {
    PathBuf::from(format!("{prefix}_part_{part_number}.{WORKBOOK_EXTENSION}"))
}

pub fn summary_path(prefix: &str) -> PathBuf {
    PathBuf::from(format!("{prefix}_overall_summary.{WORKBOOK_EXTENSION}"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Totals {
    pub jobs: usize,
    pub unique_sources: usize,
    pub viewed: u64,
    pub applied: u64,
    pub saved: u64,
    pub hidden: u64,
}

pub fn totals(rows: &[FlatRow]) -> Totals {
    let sources = rows
        .iter()
        .filter_map(|row| row.source.as_deref())
        .collect::<HashSet<_>>();
    Totals {
        jobs: rows.len(),
        unique_sources: sources.len(),
        viewed: rows.iter().map(|row| row.viewed_count).sum(),
        applied: rows.iter().map(|row| row.applied_count).sum(),
        saved: rows.iter().map(|row| row.saved_count).sum(),
        hidden: rows.iter().map(|row| row.hidden_count).sum(),
    }
}

/// Most frequent `source_and_board_token` values, count descending; ties keep
/// first-seen order. Rows with a null token are not counted.
pub fn top_companies(rows: &[FlatRow], limit: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (idx, token) in rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| Some((idx, row.source_and_board_token.as_deref()?)))
    {
        counts.entry(token).or_insert((idx, 0)).1 += 1;
    }

    let mut ranked = counts.into_iter().collect::<Vec<_>>();
    ranked.sort_by(|(_, (first_a, count_a)), (_, (first_b, count_b))| {
        count_b.cmp(count_a).then(first_a.cmp(first_b))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(name, (_, count))| (name.to_owned(), count))
        .collect()
}

#[derive(Debug, Clone)]
pub struct ExportReport {
    /// Chunk workbooks in order, then the overall summary workbook.
    pub files: Vec<PathBuf>,
    pub chunks: Vec<ChunkSpan>,
    pub totals: Totals,
    pub skipped: usize,
}

pub fn run(args: ExportArgs) -> anyhow::Result<()> {
    let options = ExportOptions::from_args(args);
    let report = try_convert(&options)?;
    for file in &report.files {
        println!("{}", file.display());
    }
    Ok(())
}

/// Runs the export and reports any failure instead of returning it.
///
/// Returns the written files, or an empty list when nothing could be exported.
pub fn convert(options: &ExportOptions) -> Vec<PathBuf> {
    match try_convert(options) {
        Ok(report) => report.files,
        Err(err) => {
            tracing::error!("export failed: {:#}", anyhow::Error::new(err));
            Vec::new()
        }
    }
}

pub fn try_convert(options: &ExportOptions) -> Result<ExportReport, ExportError> {
    if options.chunk_size == 0 {
        return Err(ExportError::InvalidChunkSize);
    }

    tracing::info!(input = %options.input.display(), "converting jobs to workbooks");
    let records = load_records(&options.input)?;
    tracing::info!(jobs = records.len(), "loaded jobs from JSON");
    if records.is_empty() {
        return Err(ExportError::EmptyInput(options.input.clone()));
    }

    let flattened = flatten_all(&records);
    if flattened.skipped > 0 {
        tracing::warn!(skipped = flattened.skipped, "some jobs were skipped");
    }
    let rows = flattened.rows;
    if rows.is_empty() {
        return Err(ExportError::NoUsableRecords {
            path: options.input.clone(),
            total: records.len(),
        });
    }
    drop(records);

    let chunks = plan_chunks(rows.len(), options.chunk_size);
    tracing::info!(
        jobs = rows.len(),
        files = chunks.len(),
        chunk_size = options.chunk_size,
        "splitting jobs into workbooks"
    );

    let mut files = Vec::with_capacity(chunks.len() + 1);
    for chunk in &chunks {
        let path = part_path(&options.prefix, chunk.part_number());
        tracing::info!(file = %path.display(), jobs = chunk.rows(), "creating workbook");
        chunk_workbook(&rows[chunk.start..chunk.end], chunk.part_number())
            .and_then(|workbook| workbook.save(&path))
            .map_err(|err| ExportError::Write {
                path: path.clone(),
                source: err.into(),
            })?;
        tracing::debug!(file = %path.display(), "created workbook");
        files.push(path);
    }

    let path = summary_path(&options.prefix);
    let overall = totals(&rows);
    summary_workbook(&rows, &overall, &chunks, options)
        .and_then(|workbook| workbook.save(&path))
        .map_err(|err| ExportError::Write {
            path: path.clone(),
            source: err.into(),
        })?;
    files.push(path);

    tracing::info!(
        files = chunks.len(),
        jobs = overall.jobs,
        columns = FlatRow::COLUMNS.len(),
        max_rows_per_file = options.chunk_size,
        summary = %summary_path(&options.prefix).display(),
        "export complete"
    );

    Ok(ExportReport {
        files,
        chunks,
        totals: overall,
        skipped: flattened.skipped,
    })
}

fn load_records(path: &Path) -> Result<Vec<Value>, ExportError> {
    let contents = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            ExportError::NotFound(path.to_path_buf())
        } else {
            ExportError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;

    let value: Value =
        serde_json::from_str(&contents).map_err(|source| ExportError::InvalidJson {
            path: path.to_path_buf(),
            source,
        })?;

    match value {
        Value::Array(records) => Ok(records),
        _ => Err(ExportError::NotAnArray(path.to_path_buf())),
    }
}

fn chunk_workbook(rows: &[FlatRow], part_number: usize) -> anyhow::Result<Workbook> {
    let mut data = Sheet::new(SHEET_JOBS_DATA, FlatRow::COLUMNS);
    for row in rows {
        data.push_row(data_row(row));
    }

    let chunk_totals = totals(rows);
    let mut summary = Sheet::new(SHEET_SUMMARY, ["Metric", "Value"]);
    for (metric, value) in [
        (format!("Jobs in Part {part_number}"), chunk_totals.jobs as u64),
        ("Unique Sources".to_owned(), chunk_totals.unique_sources as u64),
        ("Total Viewed".to_owned(), chunk_totals.viewed),
        ("Total Applied".to_owned(), chunk_totals.applied),
        ("Total Saved".to_owned(), chunk_totals.saved),
        ("Total Hidden".to_owned(), chunk_totals.hidden),
    ] {
        summary.push_row(vec![metric.into(), value.into()]);
    }

    let mut workbook = Workbook::new();
    workbook.add_sheet(data).context("add jobs data sheet")?;
    workbook.add_sheet(summary).context("add summary sheet")?;
    Ok(workbook)
}

fn summary_workbook(
    rows: &[FlatRow],
    overall: &Totals,
    chunks: &[ChunkSpan],
    options: &ExportOptions,
) -> anyhow::Result<Workbook> {
    let mut summary = Sheet::new(SHEET_OVERALL_SUMMARY, ["Metric", "Value"]);
    for (metric, value) in [
        ("Total Jobs", overall.jobs as u64),
        ("Total Excel Files", chunks.len() as u64),
        ("Jobs per File (Max)", options.chunk_size as u64),
        ("Unique Sources", overall.unique_sources as u64),
        ("Total Viewed", overall.viewed),
        ("Total Applied", overall.applied),
        ("Total Saved", overall.saved),
        ("Total Hidden", overall.hidden),
    ] {
        summary.push_row(vec![metric.into(), value.into()]);
    }

    let mut companies = Sheet::new(SHEET_TOP_COMPANIES, ["Company_Board", "Job_Count"]);
    for (name, count) in top_companies(rows, TOP_COMPANIES_LIMIT) {
        companies.push_row(vec![name.into(), count.into()]);
    }

    let mut breakdown = Sheet::new(
        SHEET_FILE_BREAKDOWN,
        ["File_Name", "Rows", "Start_Index", "End_Index"],
    );
    for chunk in chunks {
        let file_name = part_path(&options.prefix, chunk.part_number());
        breakdown.push_row(vec![
            file_name.to_string_lossy().into_owned().into(),
            chunk.rows().into(),
            (chunk.start + 1).into(),
            chunk.end.into(),
        ]);
    }

    let mut workbook = Workbook::new();
    workbook.add_sheet(summary).context("add overall summary sheet")?;
    workbook.add_sheet(companies).context("add top companies sheet")?;
    workbook.add_sheet(breakdown).context("add file breakdown sheet")?;
    Ok(workbook)
}

fn data_row(row: &FlatRow) -> Vec<Cell> {
    vec![
        row.id.as_str().into(),
        row.board_token.as_str().into(),
        row.source.as_deref().unwrap_or_default().into(),
        row.apply_url.as_str().into(),
        row.source_and_board_token.as_deref().unwrap_or_default().into(),
        row.title.as_str().into(),
        row.description_clean.as_str().into(),
        row.description_raw.as_str().into(),
        row.viewed_count.into(),
        row.applied_count.into(),
        row.saved_count.into(),
        row.hidden_count.into(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: usize, source: &str, company: &str) -> FlatRow {
        FlatRow {
            id: id.to_string(),
            board_token: String::new(),
            source: Some(source.to_owned()),
            apply_url: String::new(),
            source_and_board_token: Some(company.to_owned()),
            title: String::new(),
            description_clean: String::new(),
            description_raw: String::new(),
            viewed_count: id as u64,
            applied_count: 1,
            saved_count: 0,
            hidden_count: 2,
        }
    }

    #[test]
    fn plan_chunks_covers_every_row_once() {
        for total in 0..40 {
            for chunk_size in 1..12 {
                let chunks = plan_chunks(total, chunk_size);
                assert_eq!(chunks.len(), total.div_ceil(chunk_size));
                assert_eq!(chunks.iter().map(ChunkSpan::rows).sum::<usize>(), total);
                assert!(chunks.iter().all(|c| c.rows() > 0 && c.rows() <= chunk_size));
                for pair in chunks.windows(2) {
                    assert_eq!(pair[0].end, pair[1].start);
                }
                if let Some(first) = chunks.first() {
                    assert_eq!(first.start, 0);
                }
                if let Some(last) = chunks.last() {
                    assert_eq!(last.end, total);
                }
            }
        }
    }

    #[test]
    fn plan_chunks_has_no_trailing_empty_chunk() {
        let chunks = plan_chunks(20, 10);
        assert_eq!(
            chunks,
            vec![
                ChunkSpan { index: 0, start: 0, end: 10 },
                ChunkSpan { index: 1, start: 10, end: 20 },
            ]
        );
        assert!(plan_chunks(5, 0).is_empty());
    }

    #[test]
    fn totals_sum_engagement_and_count_sources() {
        let rows = vec![row(1, "a", "x"), row(2, "b", "y"), row(3, "a", "x")];
        assert_eq!(
            totals(&rows),
            Totals {
                jobs: 3,
                unique_sources: 2,
                viewed: 6,
                applied: 3,
                saved: 0,
                hidden: 6,
            }
        );
    }

    #[test]
    fn top_companies_orders_by_count_then_first_seen() {
        let rows = vec![
            row(1, "s", "beta"),
            row(2, "s", "alpha"),
            row(3, "s", "alpha"),
            row(4, "s", "gamma"),
            row(5, "s", "beta"),
            row(6, "s", "delta"),
        ];
        assert_eq!(
            top_companies(&rows, 50),
            vec![
                ("beta".to_owned(), 2),
                ("alpha".to_owned(), 2),
                ("gamma".to_owned(), 1),
                ("delta".to_owned(), 1),
            ]
        );
    }

    #[test]
    fn null_source_and_company_are_not_counted() {
        let mut nulls = row(4, "", "");
        nulls.source = None;
        nulls.source_and_board_token = None;
        let rows = vec![row(1, "a", "x"), nulls.clone(), nulls, row(2, "a", "x")];

        assert_eq!(totals(&rows).unique_sources, 1);
        assert_eq!(totals(&rows).jobs, 4);
        assert_eq!(top_companies(&rows, 50), vec![("x".to_owned(), 2)]);
    }

    #[test]
    fn top_companies_is_capped() {
        let rows = (0..120)
            .map(|i| row(i, "s", &format!("company-{}", i % 70)))
            .collect::<Vec<_>>();
        let top = top_companies(&rows, TOP_COMPANIES_LIMIT);
        assert_eq!(top.len(), TOP_COMPANIES_LIMIT);
        assert!(top.windows(2).all(|pair| pair[0].1 >= pair[1].1));
        assert_eq!(top[0], ("company-0".to_owned(), 2));
    }

    #[test]
    fn default_prefix_drops_json_and_jobs_suffixes() {
        assert_eq!(default_prefix(Path::new("data_scientist_jobs.json")), "data_scientist");
        assert_eq!(default_prefix(Path::new("exports.json")), "exports");
        let nested = default_prefix(Path::new("out/dir_jobs/qa_jobs.json"));
        assert_eq!(PathBuf::from(nested), Path::new("out/dir_jobs").join("qa"));
    }

    #[test]
    fn output_paths_follow_prefix() {
        assert_eq!(part_path("jobs", 3), PathBuf::from("jobs_part_3.xlsx"));
        assert_eq!(summary_path("jobs"), PathBuf::from("jobs_overall_summary.xlsx"));
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let options = ExportOptions::new("missing.json", "out").with_chunk_size(0);
        assert!(matches!(
            try_convert(&options),
            Err(ExportError::InvalidChunkSize)
        ));
    }
}
