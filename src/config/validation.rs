use crate::config::types::{ApiConfig, Config, CredentialEntry, HarvestConfig, OutputConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_credentials(&config.credentials)?;
    validate_api_config(&config.api)?;
    validate_harvest_config(&config.harvest)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates the credential list
///
/// An empty list, or any entry missing its user name or token, is fatal.
fn validate_credentials(credentials: &[CredentialEntry]) -> Result<(), ConfigError> {
    if credentials.is_empty() {
        return Err(ConfigError::MissingCredentials);
    }

    for (index, entry) in credentials.iter().enumerate() {
        if entry.user_name.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "credential #{} is missing user-name",
                index + 1
            )));
        }
        if entry.api_token.trim().is_empty() {
            return Err(ConfigError::Validation(format!(
                "credential #{} ({}) is missing api-token",
                index + 1,
                entry.user_name
            )));
        }
    }

    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base-url: {}", e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must be http or https, got '{}'",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user-agent cannot be empty".to_string(),
        ));
    }

    if config.page_size < 1 || config.page_size > 100 {
        return Err(ConfigError::Validation(format!(
            "page-size must be between 1 and 100, got {}",
            config.page_size
        )));
    }

    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.request_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "request-timeout-ms must be >= 100ms, got {}ms",
            config.request_timeout_ms
        )));
    }

    Ok(())
}

/// Validates fan-out configuration
fn validate_harvest_config(config: &HarvestConfig) -> Result<(), ConfigError> {
    if config.concurrency_per_credential < 1 || config.concurrency_per_credential > 64 {
        return Err(ConfigError::Validation(format!(
            "concurrency-per-credential must be between 1 and 64, got {}",
            config.concurrency_per_credential
        )));
    }

    if config.task_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "task-timeout-ms must be greater than zero".to_string(),
        ));
    }

    if config.run_deadline_ms == Some(0) {
        return Err(ConfigError::Validation(
            "run-deadline-ms must be greater than zero when set".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database-path cannot be empty".to_string(),
        ));
    }

    if config.data_dir.is_empty() {
        return Err(ConfigError::Validation(
            "data-dir cannot be empty".to_string(),
        ));
    }

    Ok(())
}
