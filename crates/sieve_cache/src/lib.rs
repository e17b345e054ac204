//! # sieve_cache
//!
//! Change detection and output caching for Sieve.
//!
//! This crate provides:
//! - [`Signature`], a cheap per-file identity derived from mtime and size
//! - [`CacheStore`], the in-memory entry map backed by a cache-side directory
//! - [`StagedOutputs`], output bytes written next to their final location
//!   and moved into place only when an entry is committed

pub mod entry;
mod error;
pub mod signature;
pub mod staging;
pub mod store;

pub use entry::CacheEntry;
pub use error::CacheError;
pub use signature::Signature;
pub use staging::StagedOutputs;
pub use store::CacheStore;
