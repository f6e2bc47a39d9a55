pub mod state;
pub mod output;
pub mod lock;
pub mod orchestrator;

pub use state::{EnrichConfig, EnrichEvent, RunSummary};
pub use output::{flushed_ids, read_dataset, Dataset, RecordWriter};
pub use lock::RunLock;
pub use orchestrator::EnrichmentEngine;
