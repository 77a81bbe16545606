//! Event store and organization directory for the Flow event stream.
//!
//! The event store is an append-only log keyed by 32-byte identifier. It is
//! queried two ways: by recency (newest first, optionally bounded below by a
//! timestamp) and by exact identifier. The bounded prefix scan used by the
//! polling fallback is built on the recency query.
//!
//! The directory owns organization records and their bearer credentials.
//! Tokens are stored only as SHA-256 digests; topic keys are never stored.
//!
//! All functions take a borrowed [`rusqlite::Connection`] so callers decide
//! pooling and threading. The server runs them inside `spawn_blocking`.

mod directory;
mod error;
mod event;
mod store;

pub use directory::{
    authenticate, create_organization, generate_token, get_organization, hash_token,
    IssuedOrganization, Organization,
};
pub use error::StoreError;
pub use event::{BodyFormat, DisplayBody, Event, NewEvent};
pub use store::{append_event, get_event, recent_events, select_matching, watch, WatchQuery};
