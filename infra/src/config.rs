//! Configuration management for infrastructure services
//!
//! Everything is read from environment variables. A `.env` file and the
//! environment specific file (`.env.production`, ...) are loaded first when
//! present; variables already set in the process take precedence.

use serde::{Deserialize, Serialize};
use st_shared::config::{
    CacheConfig, Environment, EskizConfig, LoggingConfig, TelegramConfig, WorkflowConfig,
};
use tracing::{info, warn};

use crate::InfrastructureError;

/// Infrastructure configuration settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InfrastructureConfig {
    pub environment: Environment,
    pub logging: LoggingConfig,
    /// Verification workflow limits and pricing
    pub workflow: WorkflowConfig,
    /// Free channel credentials
    pub telegram: TelegramConfig,
    /// Paid channel credentials
    pub eskiz: EskizConfig,
    /// Redis connection for the workflow store
    pub cache: CacheConfig,
}

impl InfrastructureConfig {
    /// Build from the current process environment
    pub fn from_env() -> Self {
        Self {
            environment: Environment::from_env(),
            logging: LoggingConfig::from_env(),
            workflow: WorkflowConfig::from_env(),
            telegram: TelegramConfig::from_env(),
            eskiz: EskizConfig::from_env(),
            cache: CacheConfig::from_env(),
        }
    }

    /// Reject settings the workflow cannot run with
    ///
    /// Production additionally requires credentials for both channels; other
    /// environments fall back to logging channels.
    pub fn validate(&self) -> Result<(), InfrastructureError> {
        self.workflow
            .validate()
            .map_err(|e| InfrastructureError::Config(format!("Invalid workflow settings: {}", e)))?;
        if self.cache.url.is_empty() {
            return Err(InfrastructureError::Config("REDIS_URL is empty".to_string()));
        }

        if self.environment.is_production() {
            if !self.telegram.is_configured() {
                return Err(InfrastructureError::Config(
                    "TELEGRAM_BOT_TOKEN is required in production".to_string(),
                ));
            }
            if !self.eskiz.is_configured() {
                return Err(InfrastructureError::Config(
                    "ESKIZ_EMAIL and ESKIZ_PASSWORD are required in production".to_string(),
                ));
            }
        } else if !self.eskiz.is_configured() {
            warn!("Eskiz credentials missing, paid SMS will only be logged");
        }

        Ok(())
    }
}

/// Load infrastructure configuration from environment
pub fn load_config() -> Result<InfrastructureConfig, InfrastructureError> {
    dotenvy::dotenv().ok(); // Load .env file if present

    let environment = Environment::from_env();
    if dotenvy::from_filename(environment.env_file()).is_ok() {
        info!("Loaded {}", environment.env_file());
    }

    let config = InfrastructureConfig::from_env();
    config.validate()?;

    info!(
        environment = %config.environment,
        max_retry_attempts = config.workflow.max_retry_attempts,
        "Infrastructure configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn production_config() -> InfrastructureConfig {
        InfrastructureConfig {
            environment: Environment::Production,
            telegram: TelegramConfig {
                bot_token: "123:abc".to_string(),
                ..Default::default()
            },
            eskiz: EskizConfig {
                email: "ops@saytoai.uz".to_string(),
                password: "secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config_is_valid_outside_production() {
        assert!(InfrastructureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_production_requires_channel_credentials() {
        assert!(production_config().validate().is_ok());

        let mut config = production_config();
        config.eskiz.password.clear();
        assert!(matches!(
            config.validate(),
            Err(InfrastructureError::Config(_))
        ));

        let mut config = production_config();
        config.telegram.bot_token.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let mut config = InfrastructureConfig::default();
        config.workflow.max_retry_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_confirmation_timeout_rejected() {
        let mut config = InfrastructureConfig::default();
        config.workflow.confirmation_timeout_minutes = i64::MAX / 2;
        match config.validate() {
            Err(InfrastructureError::Config(message)) => {
                assert!(message.contains("confirmation_timeout_minutes"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_zero_delivery_timeout_rejected() {
        let mut config = InfrastructureConfig::default();
        config.workflow.delivery_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_code_length_bounds() {
        let mut config = InfrastructureConfig::default();
        config.workflow.code_length = 3;
        assert!(config.validate().is_err());
        config.workflow.code_length = 8;
        assert!(config.validate().is_ok());
    }
}
