//! Browser and automation-driver lifecycle for unitrun.
//!
//! This crate owns everything that touches an external process or socket:
//! locating and launching Chromium, probing its DevTools endpoint, the
//! DevTools WebSocket [`connection`], and the W3C WebDriver HTTP [`webdriver`]
//! client together with the local driver [`server`] it may need to start.

pub mod browser_finder;
pub mod cdp_probe;
pub mod connection;
pub mod error;
pub mod launcher;
pub mod process;
pub mod server;
pub mod webdriver;

pub use connection::Connection;
pub use error::{Error, Result};
pub use launcher::{ChromeProcess, LaunchOptions};
pub use server::{DriverServer, DriverServerOptions};
pub use webdriver::{WebDriverClient, WebDriverSession};
