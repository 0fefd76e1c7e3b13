//! Database module for healthwatch.
//!
//! Provides SQLite storage of the latest check result per URL.

mod models;
mod store;

pub use models::*;
pub use store::*;
