//! Hegemon - database backup and restore
//!
//! This library drives full backups of PostgreSQL, MySQL and SQLite
//! databases into a local directory and restores them again, with optional
//! gzip compression, retention pruning and credential lookup.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Configuration loading, validation and path management
//! - `credentials`: Password lookup across ordered sources
//! - `connection`: Engine-specific dump and restore tooling
//! - `compression`: File-to-file codecs
//! - `backup`: Backup/restore lifecycles and the artifact catalog
//! - `notify`: Completion notifications
//! - `logging`: Tracing subscriber setup
//! - `cli`: Command handlers
//! - `error`: Custom error types
//!
//! # Example
//!
//! ```rust,ignore
//! use hegemon::config::ConfigLoader;
//!
//! let config = ConfigLoader::new().load(&path)?;
//! ```

pub mod backup;
pub mod cli;
pub mod compression;
pub mod config;
pub mod connection;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod notify;

pub use error::{HegemonError, HegemonResult};
