pub mod source;
pub mod http;
pub mod rate_limit;
pub mod client;
pub mod population;
pub mod panel;
pub mod download;

pub use source::ScoreSource;
pub use http::EpssHttpSource;
pub use rate_limit::RateLimiter;
pub use client::ScoreClient;
pub use population::PopulationSnapshot;
pub use panel::{extract_panel, PanelRow, WeeklyPanel};
pub use download::{weekly_dates, FetchSummary, SnapshotDownloader};
