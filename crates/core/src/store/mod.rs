//! SQLite-backed storage.
//!
//! One [`Db`] handle backs the page store, the option store, the response
//! cache and the site content index.

mod connection;
mod migrations;
mod options;
mod pages;
mod responses;
mod site_content;

pub use connection::Db;
pub use options::OptionKey;
pub use pages::{
    Direction, LocalFields, PageKind, PageListQuery, PageOrder, PageRecord, PageRef, PageType, PageUpdate,
    RemoteFields,
};
pub use responses::{CachedResponse, PAGE_KEY_PREFIX, ResponseCookie, page_key};
pub use site_content::SiteContent;
