//! Configuration module for Backlink Scout
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every key has a default, so both the worker and the coordinator run without
//! a file.
//!
//! # Example
//!
//! ```no_run
//! use backlink_scout::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("scout.toml")).unwrap();
//! println!("Worker will crawl {} sites at once", config.worker.parallel_sites);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ClassifierConfig, Config, CoordinatorConfig, HttpConfig, WorkerConfig, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, load_or_default};
pub use validation::{validate, validate_domain_string};
