//! HTTP plumbing shared by the source resolver, the artifact fetcher and
//! remote delegation.
//!
//! Every call is bounded by the per-call timeout from the
//! [`Configuration`](crate::Configuration).

mod client;
mod download;

pub use client::{extract_domain, HttpClient};
pub use download::DownloadManager;
