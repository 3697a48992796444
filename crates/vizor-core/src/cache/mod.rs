//! Content-addressed result cache.
//!
//! Entries are gzip-compressed JSON documents stored one per key under a
//! namespace directory:
//!
//! ```text
//! <cache_root>/<namespace>/<key>.json.gz   {"data": <payload>}
//! ```
//!
//! Nothing is evicted automatically; remove the namespace directory to clear
//! it.

mod key;
mod store;

pub use key::{CacheKey, Purpose};
pub use store::CacheStore;
