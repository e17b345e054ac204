//! # sieve_core
//!
//! Incremental, change-aware file transformation engine.
//!
//! This crate provides:
//! - The [`Filter`] pass orchestrator
//! - The [`Transform`] and [`TreeSource`] contracts implemented by callers
//! - Options loading ([`FilterOptions`])
//! - File discovery and filtering
//!
//! A [`Filter`] turns a source directory into a destination directory by
//! running a transform over every matched file. Outputs are cached between
//! passes and a file is only transformed again when its signature (mtime and
//! size) changes. All I/O goes through tokio, so passes must run inside a
//! tokio runtime.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::path::PathBuf;
//! use sieve_core::{Filter, FilterOptions, TransformOutput, transform_fn};
//!
//! let upper = transform_fn(|content, _rel, _src| {
//!     Ok(TransformOutput::from(content.as_text().unwrap_or_default().to_uppercase()))
//! });
//! let options = FilterOptions::default().with_target_extension("upper");
//! let mut filter = Filter::new(PathBuf::from("src"), upper, options)?;
//!
//! let dest = filter.build().await?;
//! println!("Output tree: {}", dest.display());
//! filter.cleanup()?;
//! ```

mod config;
mod error;
pub mod file_finder;
mod filter;
mod invoker;
mod materialize;
mod naming;
mod source;
mod transform;

pub use config::{Encoding, FilterOptions, MaterializeMode, RenameFn};
pub use error::FilterError;
pub use filter::{Filter, PassState, PassStats};
pub use source::TreeSource;
pub use transform::{
    Content, FnTransform, OutputFile, Transform, TransformError, TransformOutput, transform_fn,
};

pub use sieve_cache::{CacheEntry, Signature};
