//! # tenantload Core
//!
//! Shared foundations for the tenantload workspace: the error type, typed
//! configuration, identifier types and logging setup.
//!
//! ## Architecture
//!
//! - [`error`]: Error types and result handling
//! - [`config`]: Configuration structures and validation
//! - [`types`]: Identifier types for tenants, resources and virtual users
//! - [`telemetry`]: Structured logging initialisation
//! - [`prelude`]: Common imports for convenient usage

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod prelude;
pub mod telemetry;
pub mod types;

pub use crate::{
    config::{
        ConfigValidator, ConnectionConfig, NamingConfig, ProvisionConfig, RunConfiguration,
        StatsConfig, ThinkTime,
    },
    error::{Error, Result},
    types::{ResourceId, TenantId, Timestamp, UserId},
};

/// Current version of tenantload
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
