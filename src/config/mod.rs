//! Configuration module for criteria-sql.
//!
//! Handles the settings file and environment variable expansion.

mod settings;

pub use settings::{expand_env_vars, MetadataSettings, Settings, SettingsError};
