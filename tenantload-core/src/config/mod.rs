//! Configuration management for tenantload
//!
//! Typed configuration for connections, naming, runs, statistics and
//! provisioning. Values are supplied by the command line, validated once and
//! then shared read-only.
//!
//! # Examples
//!
//! ```rust
//! use tenantload_core::config::{ConfigValidator, RunConfiguration};
//!
//! let run = RunConfiguration::new(100, 20.0, 600);
//! ConfigValidator::validate_run(&run).expect("valid run");
//! assert_eq!(run.duration().as_secs(), 600);
//! ```

pub mod schema;
pub mod validator;

pub use schema::*;
pub use validator::ConfigValidator;
