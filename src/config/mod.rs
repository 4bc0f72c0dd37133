//! Configuration Module
//!
//! Credential and endpoint resolution.

pub mod loader;
pub mod settings;

pub use loader::ConfigLoader;
pub use settings::{ClientConfig, API_KEY_ENV, BASE_URL_ENV, DEFAULT_BASE_URL};
