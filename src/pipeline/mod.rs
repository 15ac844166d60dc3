pub mod admission;
pub mod splitter;
pub mod synthesis;
