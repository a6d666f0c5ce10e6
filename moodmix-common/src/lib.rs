//! # moodmix Common Library
//!
//! Shared code for the moodmix crates:
//! - Error taxonomy used by the build and query phases
//! - TOML configuration loading and path resolution

pub mod config;
pub mod error;

pub use error::{Error, Result};
