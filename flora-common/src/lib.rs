//! # Flora Common Library
//!
//! Shared code for the Flora services including:
//! - Error types
//! - TOML configuration resolution and loading
//! - Logging initialization
//! - Text helpers used when normalizing names and rendering prompts

pub mod config;
pub mod error;
pub mod logging;
pub mod text;

pub use error::{Error, Result};
