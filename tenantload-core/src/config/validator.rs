//! # Configuration Validation
//!
//! Cross-field checks that the `validator` derives cannot express.

use crate::{
    config::schema::{ConnectionConfig, ProvisionConfig, RunConfiguration, StatsConfig},
    Error, Result,
};
use tracing::{debug, warn};
use validator::Validate;

/// Populations above this size are allowed but usually exhaust the server's
/// connection limit.
const LARGE_POPULATION: usize = 10_000;

/// Configuration validator for run and provisioning settings
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate connection settings.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when a field is out of range.
    pub fn validate_connection(config: &ConnectionConfig) -> Result<()> {
        config.validate().map_err(Error::from)?;
        if config.ipv6 && config.host.parse::<std::net::Ipv4Addr>().is_ok() {
            warn!("IPv6 requested but host {} is an IPv4 address", config.host);
        }
        Ok(())
    }

    /// Validate run parameters.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when the spawn rate is not positive
    /// while users are requested, or when a field is out of range.
    pub fn validate_run(config: &RunConfiguration) -> Result<()> {
        debug!("Validating run configuration: {:?}", config);
        config.validate().map_err(Error::from)?;

        if config.target_population > 0 && config.spawn_rate <= 0.0 {
            return Err(Error::configuration(format!(
                "Spawn rate must be greater than 0 to start {} users",
                config.target_population
            )));
        }

        if !config.spawn_rate.is_finite() {
            return Err(Error::configuration("Spawn rate must be a finite number"));
        }

        if config.target_population > LARGE_POPULATION {
            warn!(
                "Population of {} users may exceed the server connection limit",
                config.target_population
            );
        }

        if config.target_population > 0 {
            let ramp_secs = config.target_population as f64 / config.spawn_rate;
            if ramp_secs > config.duration_secs as f64 {
                warn!(
                    "Ramp-up needs {:.1}s but the run lasts {}s; the target population will not be reached",
                    ramp_secs, config.duration_secs
                );
            }
        }

        Ok(())
    }

    /// Validate statistics settings.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when a field is out of range.
    pub fn validate_stats(config: &StatsConfig) -> Result<()> {
        config.validate().map_err(Error::from)
    }

    /// Validate provisioning parameters.
    ///
    /// # Errors
    /// Returns [`Error::Configuration`] when counts are zero.
    pub fn validate_provision(config: &ProvisionConfig) -> Result<()> {
        config.validate().map_err(Error::from)
    }
}
