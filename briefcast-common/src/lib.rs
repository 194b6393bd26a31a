//! # Briefcast Common Library
//!
//! Shared code for the Briefcast generation pipeline including:
//! - Database pool initialization and schema
//! - Signal / Episode / Segment models
//! - Configuration loading
//! - Common error types
//! - Bounded retry helper for outbound calls

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod retry;

pub use error::{Error, Result};
