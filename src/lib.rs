pub mod backends;
pub mod config;
pub mod discovery;
pub mod error;
pub mod humanize;
pub mod observability;
pub mod output;
pub mod report;
pub mod source;
pub mod target;
pub mod worker;
