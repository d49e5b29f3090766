//! Core data model, configuration, error taxonomy and corpus preparation.

pub mod chunker;
pub mod config;
pub mod data_processor;
pub mod error;
pub mod extract;
pub mod images;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
