pub mod threshold;
pub mod deceptive;
pub mod latency;

pub use threshold::{analyze, ThresholdResult, DEFAULT_THRESHOLDS};
pub use deceptive::{detect, DeceptiveLow, DEFAULT_MAX_INCLUSION_SCORE};
pub use latency::{analyze_latency, LatencyCurve, LatencyReport, DEFAULT_GROWTH_FACTORS, DEFAULT_LATENCY_THRESHOLDS};
