//! Configuration and file management for glchain
//!
//! This crate provides:
//! - File path utilities for config and cache files
//! - Configuration file loading (TOML, plus `.env`)
//! - Application configuration (AppConfig) with per-component sections

pub mod app_config;
pub mod config_file;
pub mod paths;

pub use app_config::{
    AppConfig, CacheConfig, ConfigError, GitLabConfig, MonitorConfig, MonitorProject,
    ProcessorConfig, TracerConfig,
};
pub use config_file::load_config_file;
pub use paths::{app_config_path, cache_dir, config_dir};
