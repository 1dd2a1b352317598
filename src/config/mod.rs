//! Configuration management module
//!
//! This module holds the integration config model and handles loading and
//! saving the application configuration.

pub mod integration;
pub mod loader;
pub mod schema;

pub use integration::{hash_integrations, IntegrationConfig};
pub use loader::{
    default_config, expand_path, get_config_path, load_config, load_config_from_path, save_config,
    save_config_to_path,
};
pub use schema::AppConfig;
