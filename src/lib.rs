//! Justified photo-wall engine: incremental row layout over a gallery tree,
//! bounded-concurrency thumbnail loading and navigation-aware cancellation.

pub mod config;
pub mod error;
pub mod layout;
pub mod models;
pub mod scanner;
pub mod session;
pub mod thumbnails;

#[cfg(test)]
mod testing;

pub use config::WallConfig;
pub use error::{FetchError, SessionError, ThumbnailError};
