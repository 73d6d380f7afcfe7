//! Voca session configuration.
//!
//! Provides the [`SessionConfig`] schema, TOML loading, and validation,
//! including the standalone room-password rule. Every field has a default
//! so partial configs (or none at all) work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voca_config::{load_from_path, validate_password};
//!
//! let config = load_from_path(std::path::Path::new("voca.toml")).expect("bad config");
//! assert!(validate_password("trey123").is_ok());
//! println!("{:?}", config.server_url);
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{IceServer, ReconnectConfig, SessionConfig};
pub use toml_loader::{default_config_path, from_toml_str, load_config, load_from_path};
pub use validation::{validate, validate_password, PasswordRuleViolation};
