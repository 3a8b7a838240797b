//! Command-line front end for the unitrun browser driver.

pub mod cli;
pub mod logging;
