//! Environment-backed configuration for `call-smoke`.

use std::{env, error::Error, fmt, time::Duration};

use call_core::DEFAULT_MESSAGE_HANDLER_NAME;
use call_runtime::CallSessionOptions;
use url::Url;

const DEFAULT_CALL_LINK: &str = "https://call.element.io/room#/smoke";
const DEFAULT_START_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmokeConfig {
    /// Externally hosted call link opened by the smoke session.
    pub call_link: Url,
    /// Web view message handler the listener script posts to.
    pub message_handler_name: String,
    pub allow_picture_in_picture: bool,
    /// How long to wait for the widget to report its page URL.
    pub start_timeout: Duration,
}

impl SmokeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let call_link = parse_url_with_default(
            "CALLBRIDGE_CALL_LINK",
            DEFAULT_CALL_LINK,
            &mut lookup,
        )?;
        let message_handler_name = optional_trimmed_env("CALLBRIDGE_HANDLER_NAME", &mut lookup)
            .unwrap_or_else(|| DEFAULT_MESSAGE_HANDLER_NAME.to_owned());
        let allow_picture_in_picture =
            parse_optional_bool("CALLBRIDGE_ALLOW_PIP", false, &mut lookup)?;
        let start_timeout_ms = parse_optional_u64_with_default(
            "CALLBRIDGE_START_TIMEOUT_MS",
            DEFAULT_START_TIMEOUT_MS,
            &mut lookup,
        )?;

        if start_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "CALLBRIDGE_START_TIMEOUT_MS",
                value: "0".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if !message_handler_name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
        {
            return Err(ConfigError::InvalidValue {
                key: "CALLBRIDGE_HANDLER_NAME",
                value: message_handler_name,
                reason: "must be a plain identifier".to_owned(),
            });
        }

        Ok(Self {
            call_link,
            message_handler_name,
            allow_picture_in_picture,
            start_timeout: Duration::from_millis(start_timeout_ms),
        })
    }

    pub fn session_options(&self) -> CallSessionOptions {
        CallSessionOptions {
            allow_picture_in_picture: self.allow_picture_in_picture,
            message_handler_name: self.message_handler_name.clone(),
        }
    }
}

/// Errors produced while parsing smoke configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue { key, value, reason } => {
                write!(f, "invalid {key}='{value}': {reason}")
            }
        }
    }
}

impl Error for ConfigError {}

fn optional_trimmed_env<F>(key: &'static str, lookup: &mut F) -> Option<String>
where
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_url_with_default<F>(
    key: &'static str,
    default: &str,
    lookup: &mut F,
) -> Result<Url, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let value = optional_trimmed_env(key, lookup).unwrap_or_else(|| default.to_owned());
    Url::parse(&value).map_err(|err| ConfigError::InvalidValue {
        key,
        value,
        reason: err.to_string(),
    })
}

fn parse_optional_bool<F>(
    key: &'static str,
    default: bool,
    lookup: &mut F,
) -> Result<bool, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = optional_trimmed_env(key, lookup) else {
        return Ok(default);
    };
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value,
            reason: "expected true or false".to_owned(),
        }),
    }
}

fn parse_optional_u64_with_default<F>(
    key: &'static str,
    default: u64,
    lookup: &mut F,
) -> Result<u64, ConfigError>
where
    F: FnMut(&str) -> Option<String>,
{
    let Some(value) = lookup(key) else {
        return Ok(default);
    };
    value
        .parse::<u64>()
        .map_err(|err| ConfigError::InvalidValue {
            key,
            value,
            reason: err.to_string(),
        })
}
