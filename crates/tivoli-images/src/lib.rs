//! Image loading and prefetching for the Tivoli photo client.
//!
//! The crate is built from three pieces that feed into each other:
//!
//! - [`layout`] packs images of varying aspect ratio into a fixed number of columns and derives
//!   the order in which a viewer scrolling top to bottom encounters them.
//! - [`prefetch`] turns that visual order into a lookahead window of images to warm up.
//! - [`caching`] owns the decoded images, deduplicates concurrent fetches and runs interactive
//!   and speculative background fetches against separate connection budgets.

#[macro_use]
pub mod metrics;

pub mod caching;
pub mod config;
pub mod decode;
pub mod fetch;
pub mod layout;
pub mod logging;
pub mod prefetch;
pub mod types;
pub mod utils;
