use crate::payments::signature::{OrderSecret, WebhookSecret};
use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub payments: PaymentsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentsConfig {
    /// Public key id handed to the checkout widget
    pub key_id: String,
    pub key_secret: SecretString,
    pub webhook_secret: SecretString,
    pub storage_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let server = ServerConfig {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .context("PORT not set")?
                .parse()
                .context("PORT must be a valid number")?,
            environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        };

        let database = DatabaseConfig {
            url: env::var("DATABASE_URL").context("DATABASE_URL not set")?,
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a valid number")?,
            acquire_timeout_secs: env::var("DATABASE_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .context("DATABASE_ACQUIRE_TIMEOUT_SECS must be a valid number")?,
        };

        let payments = PaymentsConfig {
            key_id: env::var("RAZORPAY_KEY_ID").context("RAZORPAY_KEY_ID not set")?,
            key_secret: SecretString::new(
                env::var("RAZORPAY_KEY_SECRET").context("RAZORPAY_KEY_SECRET not set")?,
            ),
            webhook_secret: SecretString::new(
                env::var("RAZORPAY_WEBHOOK_SECRET").context("RAZORPAY_WEBHOOK_SECRET not set")?,
            ),
            storage_timeout_ms: env::var("STORAGE_TIMEOUT_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse()
                .context("STORAGE_TIMEOUT_MS must be a valid number")?,
        };

        let config = Config {
            server,
            database,
            payments,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port < 1024 {
            return Err(anyhow!(
                "Port must be at least 1024, got {}",
                self.server.port
            ));
        }

        let valid_environments = ["development", "staging", "production"];
        if !valid_environments.contains(&self.server.environment.as_str()) {
            return Err(anyhow!(
                "Environment must be one of: {:?}, got {}",
                valid_environments,
                self.server.environment
            ));
        }

        if self.database.url.trim().is_empty() {
            return Err(anyhow!("DATABASE_URL cannot be empty"));
        }

        if self.database.max_connections == 0 {
            return Err(anyhow!("DATABASE_MAX_CONNECTIONS must be greater than 0"));
        }

        if self.payments.key_id.trim().is_empty() {
            return Err(anyhow!("RAZORPAY_KEY_ID cannot be empty"));
        }

        let key_secret = self.payments.key_secret.expose_secret();
        let webhook_secret = self.payments.webhook_secret.expose_secret();
        if key_secret.trim().is_empty() {
            return Err(anyhow!("RAZORPAY_KEY_SECRET cannot be empty"));
        }
        if webhook_secret.trim().is_empty() {
            return Err(anyhow!("RAZORPAY_WEBHOOK_SECRET cannot be empty"));
        }
        if key_secret == webhook_secret {
            return Err(anyhow!(
                "RAZORPAY_KEY_SECRET and RAZORPAY_WEBHOOK_SECRET must differ"
            ));
        }

        if self.payments.storage_timeout_ms == 0 {
            return Err(anyhow!("STORAGE_TIMEOUT_MS must be greater than 0"));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }

    pub fn order_secret(&self) -> OrderSecret {
        OrderSecret::new(self.payments.key_secret.clone())
    }

    pub fn webhook_secret(&self) -> WebhookSecret {
        WebhookSecret::new(self.payments.webhook_secret.clone())
    }

    /// Deadline applied to every storage unit of work
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.payments.storage_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
                environment: "development".to_string(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/fulfillment".to_string(),
                max_connections: 5,
                acquire_timeout_secs: 30,
            },
            payments: PaymentsConfig {
                key_id: "rzp_test_key".to_string(),
                key_secret: SecretString::new("order-secret".to_string()),
                webhook_secret: SecretString::new("webhook-secret".to_string()),
                storage_timeout_ms: 5000,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let config = valid();
        assert!(config.validate().is_ok());
        assert_eq!(config.storage_timeout(), Duration::from_secs(5));
        assert!(!config.is_production());
    }

    #[test]
    fn test_identical_secrets_are_rejected() {
        let mut config = valid();
        config.payments.webhook_secret = SecretString::new("order-secret".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut config = valid();
        config.payments.key_secret = SecretString::new("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_low_port_and_unknown_environment_are_rejected() {
        let mut config = valid();
        config.server.port = 80;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.server.environment = "qa".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_does_not_print_secrets() {
        let rendered = format!("{:?}", valid());
        assert!(!rendered.contains("order-secret"));
        assert!(!rendered.contains("webhook-secret"));
    }
}
