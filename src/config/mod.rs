//! Configuration module for Sitelens
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. All sections default sensibly, so the server also runs with no
//! config file at all.
//!
//! # Example
//!
//! ```no_run
//! use sitelens::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Renderer pool size: {}", config.renderer.pool_size);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{AuditConfig, Config, CrawlerConfig, RendererConfig, ServerConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
