pub mod monitor;
pub mod segment;
pub mod segmenter;
