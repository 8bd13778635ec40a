//! Demographic lookup tables loaded from CSV

pub mod parser;
pub mod table;

pub use parser::{parse_csv, CsvTable};
pub use table::{AgeRange, Bucket, LookupTable, TableError};
