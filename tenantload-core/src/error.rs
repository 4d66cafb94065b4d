//! Error types for the tenantload workspace.

use thiserror::Error;

/// Main error type for tenantload operations.
///
/// Variants fall into three groups: fatal startup conditions (the run never
/// starts), provisioning failures (setup/cleanup abort with context) and
/// per-operation failures (logged and counted by the harness, never fatal).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A random draw was requested over an empty or negative range
    #[error("Invalid range: count must be at least 1, got {count}")]
    InvalidRange {
        /// The requested count
        count: i64,
    },

    /// Tenant or resource metadata could not be read
    #[error("Directory unavailable: {message}")]
    DirectoryUnavailable {
        /// Underlying failure
        message: String,
    },

    /// The provisioned topology cannot host a workload
    #[error("Invalid topology: {tenants} tenant(s), {resources} resource(s) per tenant")]
    InvalidTopology {
        /// Tenants found
        tenants: u64,
        /// Resources found per tenant
        resources: u64,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong
        message: String,
    },

    /// Establishing a connection to a tenant failed
    #[error("Failed to connect to {tenant}: {message}")]
    Connection {
        /// Tenant the user tried to reach
        tenant: String,
        /// Underlying failure
        message: String,
    },

    /// A statement failed on an open connection
    #[error("Query failed ({statement}): {message}")]
    Query {
        /// Statement that failed
        statement: String,
        /// Underlying failure
        message: String,
    },

    /// An operation needed a connection the user does not hold
    #[error("No open connection")]
    NotConnected,

    /// Setup or cleanup of the topology failed
    #[error("Provisioning error: {message}")]
    Provisioning {
        /// Failing step and cause
        message: String,
    },

    /// Writing statistics to an external destination failed
    #[error("Export error: {message}")]
    Export {
        /// Underlying failure
        message: String,
    },

    /// Internal system errors
    #[error("Internal error: {message}")]
    Internal {
        /// Description
        message: String,
    },
}

/// Result type alias for tenantload operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Shorthand for a [`Error::Configuration`] error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Shorthand for a [`Error::Provisioning`] error.
    pub fn provisioning(message: impl Into<String>) -> Self {
        Self::Provisioning { message: message.into() }
    }

    /// Shorthand for a [`Error::Internal`] error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Whether the error aborts a run before any workload executes.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::InvalidRange { .. }
                | Self::DirectoryUnavailable { .. }
                | Self::InvalidTopology { .. }
                | Self::Configuration { .. }
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Configuration { message: err.to_string() }
    }
}

impl From<csv::Error> for Error {
    fn from(err: csv::Error) -> Self {
        Error::Export { message: err.to_string() }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Export { message: err.to_string() }
    }
}
