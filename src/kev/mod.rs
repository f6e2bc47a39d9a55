pub mod loader;

pub use loader::{CatalogLoader, parse_catalog};
