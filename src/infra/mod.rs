pub mod error;
pub mod git;
pub mod http;
pub mod static_site;
pub mod telemetry;
