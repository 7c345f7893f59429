//! Dataset codecs.
//!
//! - `csv`: comma-separated text with a header row

pub mod csv;

pub use self::csv::CsvCodec;
