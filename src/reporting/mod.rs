pub mod formatter;
pub mod assembler;

pub use assembler::{AnalysisReport, assemble_markdown, write_analysis_outputs, write_panel};
