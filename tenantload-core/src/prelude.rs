//! # Prelude
//!
//! Convenient access to commonly used types from tenantload core.

pub use crate::{
    config::{
        ConfigValidator, ConnectionConfig, NamingConfig, ProvisionConfig, RunConfiguration,
        StatsConfig, ThinkTime,
    },
    error::{Error, Result},
    telemetry::{init_logging, LogFormat, LogLevel, LoggingConfig},
    types::{ResourceId, TenantId, Timestamp, UserId},
};

pub use chrono::{DateTime, Utc};
pub use serde::{Deserialize, Serialize};
