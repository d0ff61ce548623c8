//! Email provider credential resolution.
//!
//! Credentials are resolved from a chain of layers, first match wins:
//!
//! 1. Process environment (`RESEND_API_KEY`, `EMAIL_FROM_ADDRESS`, `EMAIL_FROM_NAME`)
//! 2. Deployment config file (JSON, path in `EMAIL_CONFIG_FILE`)
//! 3. Mounted secrets directory (`EMAIL_SECRETS_DIR`, default `/run/secrets`),
//!    one value per file (`resend_api_key`, `email_from_address`)
//!
//! Absence of credentials is not an error: callers fall back to the no-op
//! email provider so every environment can exercise the pipeline.

use crate::{env_or_default, ConfigError};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

/// Resolved transactional-email credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailCredentials {
    pub api_key: String,
    pub from_email: String,
    pub from_name: String,
}

/// Shape of the deployment config file layer.
#[derive(Debug, Deserialize)]
struct EmailConfigFile {
    api_key: String,
    from_email: String,
    #[serde(default)]
    from_name: Option<String>,
}

const DEFAULT_FROM_NAME: &str = "Chambers";

impl EmailCredentials {
    /// Walk the layer chain and return the first complete set of credentials.
    ///
    /// Returns `Ok(None)` when no layer yields credentials; only a malformed
    /// config file is reported as an error.
    pub fn resolve() -> Result<Option<Self>, ConfigError> {
        if let Some(creds) = Self::from_process_env() {
            debug!("Email credentials resolved from process environment");
            return Ok(Some(creds));
        }

        if let Some(creds) = Self::from_config_file()? {
            debug!("Email credentials resolved from deployment config file");
            return Ok(Some(creds));
        }

        if let Some(creds) = Self::from_secrets_dir() {
            debug!("Email credentials resolved from secrets directory");
            return Ok(Some(creds));
        }

        warn!("No email credentials configured; the no-op provider will be used");
        Ok(None)
    }

    fn from_process_env() -> Option<Self> {
        let api_key = std::env::var("RESEND_API_KEY").ok()?;
        let from_email = std::env::var("EMAIL_FROM_ADDRESS").ok()?;
        Some(Self {
            api_key,
            from_email,
            from_name: env_or_default("EMAIL_FROM_NAME", DEFAULT_FROM_NAME),
        })
    }

    fn from_config_file() -> Result<Option<Self>, ConfigError> {
        let Ok(path) = std::env::var("EMAIL_CONFIG_FILE") else {
            return Ok(None);
        };

        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileError {
            path: path.clone(),
            details: e.to_string(),
        })?;

        let parsed: EmailConfigFile =
            serde_json::from_str(&raw).map_err(|e| ConfigError::FileError {
                path,
                details: e.to_string(),
            })?;

        Ok(Some(Self {
            api_key: parsed.api_key,
            from_email: parsed.from_email,
            from_name: parsed
                .from_name
                .unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
        }))
    }

    fn from_secrets_dir() -> Option<Self> {
        let dir = env_or_default("EMAIL_SECRETS_DIR", "/run/secrets");
        let api_key = read_secret(&dir, "resend_api_key")?;
        let from_email = read_secret(&dir, "email_from_address")?;
        let from_name =
            read_secret(&dir, "email_from_name").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string());

        Some(Self {
            api_key,
            from_email,
            from_name,
        })
    }
}

fn read_secret(dir: &str, name: &str) -> Option<String> {
    let value = std::fs::read_to_string(Path::new(dir).join(name)).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
