pub mod driver;
pub mod error;
pub mod parser;
pub mod report;
pub mod runner;
pub mod utils;

// Re-export common items
pub use error::{DriverError, StartupError, StepError};
pub use parser::load_flow;
pub use report::write_report;
pub use runner::FlowRunner;
