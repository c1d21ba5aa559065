//! # Catalog Common Library
//!
//! Shared code for the AI usage catalog services:
//! - Database initialization, schema, and domain models
//! - Error types
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
