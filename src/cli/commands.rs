use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "kev-epss", version, about = "Cross-reference CISA KEV entries with EPSS scores")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// YAML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the KEV x EPSS dataset for one year
    Enrich(EnrichArgs),
    /// Compute recall, workload and deceptive-low results from a dataset
    Analyze(AnalyzeArgs),
    /// Download weekly EPSS population snapshots
    FetchSnapshots(FetchSnapshotsArgs),
}

#[derive(Args, Clone)]
pub struct EnrichArgs {
    /// Keep KEV entries added in this year
    #[arg(long, default_value_t = 2025)]
    pub year: i32,

    /// Output JSON Lines file
    #[arg(short, long, default_value = "kev_2025_epss.jsonl")]
    pub out: String,

    /// Continue a previous run against the same output
    #[arg(long)]
    pub resume: bool,

    /// Pin the snapshot query to this date (YYYY-MM-DD); latest when omitted
    #[arg(long)]
    pub asof: Option<String>,

    /// KEV JSON feed URL or local file
    #[arg(long)]
    pub kev_url: Option<String>,

    /// EPSS API base URL
    #[arg(long)]
    pub epss_url: Option<String>,

    /// Checkpoint database path (default: <out>.checkpoint.db)
    #[arg(long)]
    pub checkpoint: Option<String>,

    /// Minimum interval between EPSS requests in milliseconds
    #[arg(long)]
    pub sleep_ms: Option<u64>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per request, including the first
    #[arg(long)]
    pub retries: Option<u32>,
}

#[derive(Args, Clone)]
pub struct AnalyzeArgs {
    /// Dataset produced by `enrich`
    #[arg(short, long, default_value = "kev_2025_epss.jsonl")]
    pub input: String,

    /// EPSS daily snapshot CSV used for workload counts
    #[arg(short, long)]
    pub population: Option<String>,

    /// Comma-separated score thresholds
    #[arg(long, value_delimiter = ',')]
    pub thresholds: Option<Vec<f64>>,

    /// Ceiling for the deceptive-low list (strictly below)
    #[arg(long)]
    pub max_inclusion_score: Option<f64>,

    /// Directory for analysis outputs
    #[arg(long, default_value = "analysis")]
    pub out_dir: String,

    /// Print the results as JSON instead of tables
    #[arg(long)]
    pub json: bool,

    /// Folder of epss_scores-YYYY-MM-DD.csv(.gz) snapshots for the latency analysis
    #[arg(long)]
    pub snap_dir: Option<String>,

    /// Comma-separated thresholds for time-to-threshold latency
    #[arg(long, value_delimiter = ',')]
    pub latency_thresholds: Option<Vec<f64>>,

    /// Comma-separated growth factors over the baseline score
    #[arg(long, value_delimiter = ',')]
    pub growth: Option<Vec<f64>>,
}

#[derive(Args, Clone)]
pub struct FetchSnapshotsArgs {
    /// First date considered (YYYY-MM-DD)
    #[arg(long, default_value = "2025-01-01")]
    pub start: String,

    /// Last date considered (YYYY-MM-DD)
    #[arg(long, default_value = "2025-12-31")]
    pub end: String,

    /// Day of the week to download
    #[arg(long, default_value = "mon")]
    pub weekday: String,

    /// Directory for the snapshot files
    #[arg(long, default_value = "data/epss_weekly_2025")]
    pub out_dir: String,

    /// Download again even if the file exists
    #[arg(long)]
    pub force: bool,

    /// Base URL serving the snapshot files
    #[arg(long)]
    pub base_url: Option<String>,

    /// Pause between files in milliseconds
    #[arg(long, default_value_t = 1500)]
    pub sleep_ms: u64,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Attempts per file, including the first
    #[arg(long)]
    pub retries: Option<u32>,
}
