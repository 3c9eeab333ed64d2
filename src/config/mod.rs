//! Configuration module for Hegemon
//!
//! This module provides:
//! - `${VAR}` environment substitution
//! - The typed, immutable configuration model
//! - JSON loading with fail-fast validation
//! - Default config path resolution

pub mod env;
pub mod loader;
pub mod model;
pub mod paths;

pub use env::substitute_env_vars;
pub use loader::{ConfigLoader, ConfigOverrides};
pub use model::{
    BackupConfig, CompressionConfig, ConfigModel, DatabaseConfig, DatabaseType, LogLevel,
    LoggingConfig, RetentionPolicy, SecurityConfig, StorageConfig,
};
pub use paths::default_config_path;
