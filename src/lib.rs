//! Commit preview service for Hugo sites.
//!
//! Each `/preview/<commit>/` request clones the configured repository, checks
//! out the commit and runs `hugo` on a single background worker before the
//! rendered output is served.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
