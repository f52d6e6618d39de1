use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Download search results into a JSON array of job records.
    Fetch(FetchArgs),
    /// Convert a JSON array of job records into chunked workbooks.
    Export(ExportArgs),
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Search term, e.g. "Data Scientist".
    #[arg(long)]
    pub query: String,

    /// Output JSON path (default: `<query>_jobs.json`).
    #[arg(long)]
    pub out: Option<String>,

    /// Search API base URL.
    #[arg(long, default_value = "https://hiring.cafe")]
    pub base_url: String,

    /// Jobs requested per page.
    #[arg(long, default_value_t = 1000)]
    pub page_size: usize,

    /// Maximum number of pages to request.
    #[arg(long, default_value_t = 51)]
    pub max_pages: u32,

    /// JSON file replacing the built-in search filters.
    #[arg(long)]
    pub search_state: Option<String>,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Input JSON file (`.json` is appended when missing).
    #[arg(long)]
    pub input: String,

    /// Output file prefix (default: input name without `.json` / `_jobs`).
    #[arg(long)]
    pub prefix: Option<String>,

    /// Maximum data rows per workbook.
    #[arg(long, default_value_t = crate::export::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
}
