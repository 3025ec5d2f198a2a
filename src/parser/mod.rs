pub mod loader;
pub mod types;

pub use loader::{load_flow, parse_flow, FlowFormat};
pub use types::{Flow, Step, StepKind, WaitState};
