//! # CXR Common Library
//!
//! Shared code for the chest X-ray review workspace including:
//! - Error type covering persistence, inference and annotation failures
//! - Bootstrap configuration loading
//! - Label catalog (finding codes and display metadata)
//! - Seed record formats exchanged between cohort export and reload
//! - SQLite schema bootstrap, find-or-create primitive and unit of work

pub mod config;
pub mod db;
pub mod error;
pub mod labels;
pub mod seeds;
pub mod time;

pub use error::{Error, Result};
pub use labels::LabelCatalog;
