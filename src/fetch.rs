use std::fs::File;
use std::io::{BufWriter, Write as _};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use reqwest::blocking::Client;
use reqwest::header::{
    ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, ORIGIN, REFERER,
    USER_AGENT,
};
use serde_json::Value;
use url::Url;

use crate::cli::FetchArgs;

const DEFAULT_SEARCH_STATE: &str = include_str!("search_state.json");
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const COUNT_PATH: &str = "api/search-jobs/get-total-count";
const SEARCH_PATH: &str = "api/search-jobs";
const BATCH_KEYS: [&str; 5] = ["results", "jobs", "data", "items", "content"];
const LOG_SNIPPET_CHARS: usize = 300;

/// Where a page's job list was found in the response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchShape {
    Key(&'static str),
    ElasticsearchHits,
    TopLevelArray,
    Missing,
}

/// Best-effort extraction of the job list from one search response.
pub fn detect_batch(body: &Value) -> (Vec<Value>, BatchShape) {
    match body {
        Value::Array(items) => (items.clone(), BatchShape::TopLevelArray),
        Value::Object(object) => {
            let keyed = BATCH_KEYS.iter().find_map(|key| {
                object
                    .get(*key)
                    .and_then(Value::as_array)
                    .map(|items| (items.clone(), BatchShape::Key(*key)))
            });
            if let Some((items, shape)) = &keyed
                && !items.is_empty()
            {
                return (items.clone(), *shape);
            }

            if let Some(hits) = object
                .get("hits")
                .and_then(|hits| hits.get("hits"))
                .and_then(Value::as_array)
            {
                let items = hits
                    .iter()
                    .map(|hit| hit.get("_source").unwrap_or(hit).clone())
                    .collect::<Vec<_>>();
                return (items, BatchShape::ElasticsearchHits);
            }

            keyed.unwrap_or((Vec::new(), BatchShape::Missing))
        }
        _ => (Vec::new(), BatchShape::Missing),
    }
}

/// The search-state document with `searchQuery` set to `query`.
pub fn search_state(query: &str, override_path: Option<&Path>) -> anyhow::Result<Value> {
    let raw = match override_path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("read search state: {}", path.display()))?,
        None => DEFAULT_SEARCH_STATE.to_owned(),
    };
    let mut state: Value = serde_json::from_str(&raw).context("parse search state")?;
    let Some(object) = state.as_object_mut() else {
        anyhow::bail!("search state must be a JSON object");
    };
    object.insert("searchQuery".to_owned(), Value::String(query.to_owned()));
    Ok(state)
}

/// `Data Scientist` → `data_scientist_jobs.json`.
pub fn default_output_path(query: &str) -> PathBuf {
    PathBuf::from(format!("{}_jobs.json", query.to_lowercase().replace(' ', "_")))
}

#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub base_url: String,
    pub page_size: usize,
    pub max_pages: u32,
}

pub struct Retriever {
    client: Client,
    count_url: Url,
    search_url: Url,
    page_size: usize,
    max_pages: u32,
}

impl Retriever {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        if config.page_size == 0 {
            anyhow::bail!("--page-size must be > 0");
        }
        if config.max_pages == 0 {
            anyhow::bail!("--max-pages must be > 0");
        }

        let mut base = Url::parse(&config.base_url).context("parse --base-url")?;
        if base.scheme() != "http" && base.scheme() != "https" {
            anyhow::bail!("--base-url must be http/https: {base}");
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .default_headers(browser_headers(&base)?)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("build http client")?;

        Ok(Self {
            client,
            count_url: base.join(COUNT_PATH).context("build count url")?,
            search_url: base.join(SEARCH_PATH).context("build search url")?,
            page_size: config.page_size,
            max_pages: config.max_pages,
        })
    }

    /// Total matching jobs as reported by the API, 0 when unknown.
    pub fn total_count(&self, state: &Value) -> u64 {
        let payload = serde_json::json!({ "searchState": state });
        let response = match self.client.post(self.count_url.as_str()).json(&payload).send() {
            Ok(response) => response,
            Err(err) => {
                tracing::warn!(url = %self.count_url, "count request failed: {err}");
                return 0;
            }
        };

        let status = response.status();
        tracing::debug!(%status, "count response");
        if !status.is_success() {
            tracing::warn!(%status, "count request was not successful; total unknown");
            return 0;
        }

        let body = response.text().unwrap_or_default();
        match serde_json::from_str::<Value>(&body) {
            Ok(value) => match value.get("total").and_then(Value::as_u64) {
                Some(total) => {
                    tracing::info!(total, "total jobs available");
                    total
                }
                None => {
                    tracing::debug!(body = %snippet(&body), "count response has no total");
                    0
                }
            },
            Err(_) => {
                tracing::warn!(body = %snippet(&body), "count response is not JSON");
                0
            }
        }
    }

    pub fn fetch_all(&self, state: &Value, total: u64) -> anyhow::Result<Vec<Value>> {
        let mut jobs = Vec::new();

        for page in 0..self.max_pages {
            let Some(batch) = self.fetch_page(state, page)? else {
                break;
            };
            if batch.is_empty() {
                tracing::info!(page, "no jobs in this page");
                break;
            }

            let batch_len = batch.len();
            jobs.extend(batch);
            tracing::info!(page, batch = batch_len, collected = jobs.len(), "fetched page");

            if batch_len < self.page_size || (total > 0 && jobs.len() as u64 >= total) {
                tracing::info!(collected = jobs.len(), "reached end of results");
                return Ok(jobs);
            }
            if page + 1 == self.max_pages {
                tracing::warn!(max_pages = self.max_pages, "reached maximum page limit");
            }
        }

        Ok(jobs)
    }

    /// One search page; `None` stops pagination without failing the fetch.
    fn fetch_page(&self, state: &Value, page: u32) -> anyhow::Result<Option<Vec<Value>>> {
        let payload = serde_json::json!({
            "size": self.page_size,
            "page": page,
            "searchState": state,
        });

        tracing::debug!(page, size = self.page_size, "requesting page");
        let response = self
            .client
            .post(self.search_url.as_str())
            .json(&payload)
            .send()
            .with_context(|| format!("POST {}", self.search_url))?;

        let status = response.status();
        let body = response
            .text()
            .with_context(|| format!("read search response body (page {page})"))?;
        if !status.is_success() {
            tracing::warn!(page, %status, body = %snippet(&body), "search request failed");
            return Ok(None);
        }

        let value: Value = match serde_json::from_str(&body) {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(page, body = %snippet(&body), "search response is not JSON");
                return Ok(None);
            }
        };

        let (batch, shape) = detect_batch(&value);
        tracing::debug!(page, ?shape, items = batch.len(), "detected job batch");
        Ok(Some(batch))
    }
}

pub fn run(args: FetchArgs) -> anyhow::Result<()> {
    let state = search_state(&args.query, args.search_state.as_deref().map(Path::new))?;
    let retriever = Retriever::new(&FetchConfig {
        base_url: args.base_url.clone(),
        page_size: args.page_size,
        max_pages: args.max_pages,
    })?;

    tracing::info!(query = %args.query, base_url = %args.base_url, "fetching jobs");
    let total = retriever.total_count(&state);
    let jobs = retriever
        .fetch_all(&state, total)
        .with_context(|| format!("fetch jobs for {:?}", args.query))?;

    if jobs.is_empty() {
        anyhow::bail!("no jobs found for {:?}", args.query);
    }

    let out = args
        .out
        .map(PathBuf::from)
        .unwrap_or_else(|| default_output_path(&args.query));
    save_jobs(&out, &jobs)?;

    if let Some(first) = jobs.first().and_then(Value::as_object) {
        let keys = first.keys().take(10).cloned().collect::<Vec<_>>();
        tracing::debug!(keys = %keys.join(", "), "job record fields");
    }
    tracing::info!(jobs = jobs.len(), out = %out.display(), "saved jobs");
    println!("{}", out.display());
    Ok(())
}

fn save_jobs(path: &Path, jobs: &[Value]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create jobs output dir: {}", parent.display()))?;
    }

    let file =
        File::create(path).with_context(|| format!("create jobs file: {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, jobs).context("serialize jobs")?;
    out.write_all(b"\n").context("write jobs newline")?;
    out.flush()
        .with_context(|| format!("flush jobs file: {}", path.display()))?;
    Ok(())
}

fn browser_headers(base: &Url) -> anyhow::Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/plain, */*"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(
        REFERER,
        HeaderValue::from_str(base.as_str()).context("build referer header")?,
    );
    headers.insert(
        ORIGIN,
        HeaderValue::from_str(&base.origin().ascii_serialization())
            .context("build origin header")?,
    );
    for (name, value) in [
        ("sec-fetch-dest", "empty"),
        ("sec-fetch-mode", "cors"),
        ("sec-fetch-site", "same-origin"),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }
    Ok(headers)
}

fn snippet(body: &str) -> String {
    body.chars().take(LOG_SNIPPET_CHARS).collect()
}
