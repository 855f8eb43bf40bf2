//! Client code for pagemirror.
//!
//! This crate provides the remote client (status classification and token
//! refresh), content API access, OAuth2 sign-in helpers and the HTML
//! rewrites applied to mirrored pages.

pub mod content;
pub mod html;
pub mod oauth;
pub mod remote;
pub mod url;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use content::{ContentApi, PageFeed, PageListing, PageQuery, RemotePage};
pub use remote::{
    Outcome, RemoteClient, RemoteError, RemoteRequest, RemoteResponse, ReqwestTransport, Transport, TransportError,
};
