//! Decision core for incremental page regeneration.
//!
//! See [`cache`] for the canonical key, freshness and invalidation components.

pub mod cache;
pub mod config;
pub mod error;
pub mod infra;
