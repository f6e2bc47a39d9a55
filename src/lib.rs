pub mod analysis;
pub mod cli;
pub mod config;
pub mod db;
pub mod epss;
pub mod errors;
pub mod kev;
pub mod models;
pub mod pipeline;
pub mod reporting;
pub mod utils;
