pub mod api;
pub mod config;
pub mod error;
pub mod estimation;
pub mod ingest;
pub mod report;
pub mod runner;
pub mod state;
pub mod store;
