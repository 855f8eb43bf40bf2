//! Core types and shared functionality for pagemirror.
//!
//! This crate provides:
//! - SQLite storage for pages, options, cached responses and host content
//! - Slug normalization
//! - Unified error types
//! - Configuration structures

pub mod config;
pub mod error;
pub mod slug;
pub mod store;

pub use config::AppConfig;
pub use error::Error;
pub use store::{CachedResponse, Db, PageKind, PageRecord, PageType, page_key};
