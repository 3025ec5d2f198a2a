pub mod json;
pub mod types;

pub use json::{write_report, DEFAULT_REPORT_DIR};
pub use types::RunReport;
