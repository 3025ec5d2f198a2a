pub mod driver;

pub use driver::{BrowserType, WebLauncher, WebLauncherConfig, WebSession, BROWSER_PATH_ENV};
