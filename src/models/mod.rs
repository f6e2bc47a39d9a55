pub mod catalog;
pub mod score;
pub mod record;

pub use catalog::CatalogEntry;
pub use score::{QueryDate, ScoreLookup, ScoreObservation, SnapshotMode};
pub use record::EnrichedRecord;
