//! Configuration structs and defaults.

use serde::{Deserialize, Serialize};

use crate::wsman::executor::{AMT_HTTPS_PORT, AMT_HTTP_PORT};

pub const HOSTNAME_PLACEHOLDER: &str = "[YOUR_AMT_HOST]";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AmtConfig {
    pub endpoint: EndpointSettings,
    pub credentials: CredentialSettings,
    #[serde(default)]
    pub power: PowerSettings,
    #[serde(default)]
    pub wsman: WsmanSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub hostname: String,
    pub tls: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,             // defaults to 16992 / 16993
    #[serde(default = "default_verify_tls")]
    pub verify_tls: bool,
}

impl EndpointSettings {
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(if self.tls { AMT_HTTPS_PORT } else { AMT_HTTP_PORT })
    }
}

pub fn default_verify_tls() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSettings {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerSettings {
    #[serde(default = "default_prefer_graceful")]
    pub prefer_graceful: bool,         // needs LMS running in the OS
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    #[serde(default)]
    pub wait_timeout_secs: Option<f64>, // None = wait until cancelled
}

pub fn default_prefer_graceful() -> bool { true }
pub fn default_poll_interval() -> f64 { 1.0 }

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            prefer_graceful: true,
            poll_interval_secs: 1.0,
            wait_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsmanSettings {
    pub binary: String,
}

impl Default for WsmanSettings {
    fn default() -> Self {
        Self { binary: "wsman".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub log_level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self { log_level: "INFO".to_string() }
    }
}

impl Default for AmtConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointSettings {
                hostname: HOSTNAME_PLACEHOLDER.to_string(), // Placeholder forces user configuration
                tls: false,
                port: None,
                verify_tls: true,
            },
            credentials: CredentialSettings {
                username: "admin".to_string(),
                password: String::new(),
            },
            power: PowerSettings::default(),
            wsman: WsmanSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl AmtConfig {
    /// Copy safe to print: password masked.
    pub fn redacted(&self) -> AmtConfig {
        let mut copy = self.clone();
        if !copy.credentials.password.is_empty() {
            copy.credentials.password = "********".to_string();
        }
        copy
    }
}
