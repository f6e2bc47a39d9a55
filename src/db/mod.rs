pub mod connection;
pub mod schema;
pub mod checkpoint;

pub use connection::Database;
pub use checkpoint::CheckpointStore;
