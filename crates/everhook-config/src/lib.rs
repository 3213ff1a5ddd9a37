//! # Everhook Config
//!
//! Configuration file, validation and the launch arguments file.

mod error;
mod launch;
mod loader;
mod schema;
mod validator;

pub use error::ConfigError;
pub use launch::{LAUNCH_FILE, LAUNCH_TEMPLATE, LaunchFile, parse_launch_args};
pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::{ConfigValidator, ValidationError, ValidationResult, ValidationWarning};
