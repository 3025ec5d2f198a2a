#[cfg(test)]
pub mod mock;
pub mod traits;
pub mod web;

pub use traits::{BrowserSession, DriverResult, FrameContext, SessionLauncher, UrlMatch};
