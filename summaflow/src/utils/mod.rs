//! Utility functions for timestamps and filesystem handling.

pub mod fs;
pub mod timestamps;

pub use fs::{create_directories, get_size, is_missing_or_empty, list_entry_names, list_files_recursive};
pub use timestamps::{freshness_window, is_modified_within, iso_timestamp, run_id_at, Timestamp};
