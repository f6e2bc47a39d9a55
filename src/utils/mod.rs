pub mod clock;
pub mod formatting;
pub mod fs;
