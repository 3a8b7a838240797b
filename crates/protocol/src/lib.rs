//! Wire types for the browser automation protocols unitrun speaks.
//!
//! Two protocols are covered:
//! * [`cdp`]: Chrome DevTools Protocol envelopes and the handful of
//!   `Page`/`Runtime` payloads the DevTools backend reads and writes
//! * [`webdriver`]: W3C WebDriver JSON bodies used by the remote session backend
//!
//! Types here are pure data. Behavior lives in `unitrun-runtime`.

pub mod cdp;
pub mod webdriver;
