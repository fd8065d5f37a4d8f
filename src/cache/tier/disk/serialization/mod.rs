//! On-disk entry record format

pub mod binary_format;

pub use binary_format::EntryRecord;
