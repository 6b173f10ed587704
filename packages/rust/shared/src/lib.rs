//! Shared types, error model, and configuration for meeplesync.
//!
//! This crate is the foundation depended on by all other meeplesync crates.
//! It provides:
//! - [`MeeplesyncError`] — the unified error type
//! - Domain types ([`TagFlag`], [`ExpansionRef`], wire constants)
//! - Configuration ([`AppConfig`], [`RetryConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    ApiConfig, AppConfig, LicensesConfig, OutputConfig, RetryConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from,
};
pub use error::{MeeplesyncError, Result};
pub use types::{
    BASE_GAME_TYPE, EN_DASH, EXPANSION_LINK_TYPE, ExpansionRef, SENTINEL_ZERO_COLUMNS,
    TAXONOMY_LINK_TYPES, TagFlag, default_output_columns, default_tag_flags,
};
