//! Configuration loading
//!
//! Builds a validated [`myinvois_domain::ClientConfig`] from environment
//! variables or a TOML/JSON file.

pub mod loader;

pub use loader::{load, load_from_env, load_from_file, probe_config_paths};
