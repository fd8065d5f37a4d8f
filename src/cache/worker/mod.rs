//! Background cleaning worker
//!
//! Each cache instance owns one [`BackgroundCleaner`]; the cleaner owns at most
//! one worker thread and runs at most one pass at a time.

pub mod manager;
pub mod types;

pub use manager::BackgroundCleaner;
pub use types::CleaningTask;
