//! browsedex - aggregate local browser history and search it
//!
//! This crate provides:
//! - Extractors that import history from Chromium-family browsers, Firefox and Safari
//! - A content store of URLs, visits and content-addressed page documents
//! - A polite per-domain crawler and a batched scrape/index pipeline
//! - Full-text search over an SQLite FTS5 index, with match highlighting

pub mod commands;
pub mod config;
pub mod crawl;
pub mod distill;
pub mod error;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sources;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};
