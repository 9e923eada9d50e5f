//! Subtrack — offline-first subscription tracker core.

pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod store;
pub mod sync;
