use std::fmt;

use crate::constants::MAX_LEASE_SECS;
use crate::models::{AllocationConfig, AppConfig, ReclaimConfig, ToggleConfig};

#[derive(Debug, Clone)]
pub struct ConfigError {
    pub field: String,
    pub message: String,
    pub actual_value: Option<String>,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual_value {
            Some(val) => write!(f, "  • {}: {} (got: {})", self.field, self.message, val),
            None => write!(f, "  • {}: {}", self.field, self.message),
        }
    }
}

impl ConfigError {
    fn with_value(
        field: impl Into<String>,
        message: impl Into<String>,
        value: impl ToString,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            actual_value: Some(value.to_string()),
        }
    }
}

/// Collects every problem instead of stopping at the first one.
pub fn validate_app_config(config: &AppConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.server.port == 0 {
        errors.push(ConfigError::with_value(
            "server.port",
            "must be between 1 and 65535",
            config.server.port,
        ));
    }
    if config.server.max_body_bytes < 1024 {
        errors.push(ConfigError::with_value(
            "server.max_body_bytes",
            "must be at least 1024",
            config.server.max_body_bytes,
        ));
    }
    if config.database.busy_timeout_ms == 0 {
        errors.push(ConfigError::with_value(
            "database.busy_timeout_ms",
            "must be greater than 0",
            config.database.busy_timeout_ms,
        ));
    }
    validate_allocation(&config.allocation, &mut errors);
    validate_toggle(&config.toggle, &mut errors);
    validate_reclaim(&config.reclaim, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_allocation(config: &AllocationConfig, errors: &mut Vec<ConfigError>) {
    if config.lease_secs == 0 || config.lease_secs > MAX_LEASE_SECS {
        errors.push(ConfigError::with_value(
            "allocation.lease_secs",
            format!("must be between 1 and {}", MAX_LEASE_SECS),
            config.lease_secs,
        ));
    }
    if config.proxy_use_cap < 1 {
        errors.push(ConfigError::with_value(
            "allocation.proxy_use_cap",
            "must be at least 1",
            config.proxy_use_cap,
        ));
    }
    if config.max_extend_secs == 0 || config.max_extend_secs > MAX_LEASE_SECS {
        errors.push(ConfigError::with_value(
            "allocation.max_extend_secs",
            format!("must be between 1 and {}", MAX_LEASE_SECS),
            config.max_extend_secs,
        ));
    }
}

fn validate_toggle(config: &ToggleConfig, errors: &mut Vec<ConfigError>) {
    let url = config.actuator_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ConfigError::with_value(
            "toggle.actuator_url",
            "must be an http:// or https:// URL",
            url,
        ));
    }
    if config.max_retries == 0 {
        errors.push(ConfigError::with_value(
            "toggle.max_retries",
            "must be at least 1",
            config.max_retries,
        ));
    }
    if config.actuation_timeout_secs == 0 {
        errors.push(ConfigError::with_value(
            "toggle.actuation_timeout_secs",
            "must be greater than 0",
            config.actuation_timeout_secs,
        ));
    }
    if config.virtual_port_threshold <= config.subnet_port_base {
        errors.push(ConfigError::with_value(
            "toggle.virtual_port_threshold",
            format!("must be above subnet_port_base ({})", config.subnet_port_base),
            config.virtual_port_threshold,
        ));
    }
}

fn validate_reclaim(config: &ReclaimConfig, errors: &mut Vec<ConfigError>) {
    if config.interval_secs == 0 {
        errors.push(ConfigError::with_value(
            "reclaim.interval_secs",
            "must be greater than 0",
            config.interval_secs,
        ));
    }
    if config.rescan_enabled && config.rescan_interval_secs == 0 {
        errors.push(ConfigError::with_value(
            "reclaim.rescan_interval_secs",
            "must be greater than 0 when rescan is enabled",
            config.rescan_interval_secs,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(validate_app_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn every_problem_is_reported() {
        let mut config = AppConfig::default();
        config.allocation.proxy_use_cap = 0;
        config.toggle.actuator_url = "ftp://device".into();
        config.reclaim.interval_secs = 0;
        let errors = validate_app_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "allocation.proxy_use_cap",
                "toggle.actuator_url",
                "reclaim.interval_secs"
            ]
        );
        assert!(errors[1].to_string().contains("ftp://device"));
    }

    #[test]
    fn lease_lengths_are_bounded() {
        let mut config = AppConfig::default();
        config.allocation.lease_secs = 10_u64.pow(16);
        config.allocation.max_extend_secs = MAX_LEASE_SECS + 1;
        let errors = validate_app_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["allocation.lease_secs", "allocation.max_extend_secs"]
        );

        config.allocation.lease_secs = MAX_LEASE_SECS;
        config.allocation.max_extend_secs = MAX_LEASE_SECS;
        assert!(validate_app_config(&config).is_ok());
    }
}
