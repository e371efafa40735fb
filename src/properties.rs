//! Property-driven configuration.
//!
//! A closed table maps option names (`<prefix>.endpoint`, `<prefix>.servers`, ...)
//! to pure functions over [`ClientConfiguration`].

use crate::config::{ClientConfiguration, TracingLogger};
use crate::error::{ClientError, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A recognized configuration option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigOption {
    Endpoint,
    WsseUser,
    WssePwd,
    ConnectionTimeout,
    ReceiveTimeout,
    InLogger,
    OutLogger,
    Logger,
    Servers,
    UseMock,
}

impl ConfigOption {
    /// Every option, in application order. `logger` precedes the
    /// direction-specific loggers so those override it.
    pub const ALL: [ConfigOption; 10] = [
        ConfigOption::Endpoint,
        ConfigOption::WsseUser,
        ConfigOption::WssePwd,
        ConfigOption::ConnectionTimeout,
        ConfigOption::ReceiveTimeout,
        ConfigOption::Logger,
        ConfigOption::InLogger,
        ConfigOption::OutLogger,
        ConfigOption::Servers,
        ConfigOption::UseMock,
    ];

    /// Property name, without prefix.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Endpoint => "endpoint",
            Self::WsseUser => "wsseUser",
            Self::WssePwd => "wssePwd",
            Self::ConnectionTimeout => "connectionTimeout",
            Self::ReceiveTimeout => "receiveTimeout",
            Self::InLogger => "inLogger",
            Self::OutLogger => "outLogger",
            Self::Logger => "logger",
            Self::Servers => "servers",
            Self::UseMock => "useMock",
        }
    }

    pub fn doc(&self) -> &'static str {
        match self {
            Self::Endpoint => "Endpoint template; `{{server}}` is replaced by each candidate server",
            Self::WsseUser => "WS-Security UsernameToken user",
            Self::WssePwd => "WS-Security UsernameToken password (sent as PasswordText)",
            Self::ConnectionTimeout => "Connection timeout in milliseconds",
            Self::ReceiveTimeout => "Receive timeout in milliseconds",
            Self::InLogger => "Logger name for inbound messages",
            Self::OutLogger => "Logger name for outbound messages",
            Self::Logger => "Logger name for inbound and outbound messages",
            Self::Servers => "Comma-separated candidate servers, tried in order",
            Self::UseMock => "Use the configured mocked port instead of electing one",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|option| option.name() == name)
    }

    /// Full property key under a prefix.
    pub fn key(&self, prefix: &str) -> String {
        format!("{}.{}", prefix, self.name())
    }

    /// Apply a property value. An absent value leaves the configuration unchanged.
    pub fn apply(&self, config: &ClientConfiguration, value: Option<&str>) -> Result<ClientConfiguration> {
        debug!(option = self.name(), value = ?value.map(|v| self.redact(v)), "autoconfigure");

        let Some(value) = value else {
            return Ok(config.clone());
        };

        let configured = match self {
            Self::Endpoint => config.with_endpoint(value),
            Self::WsseUser => config.with_wsse_user(value),
            Self::WssePwd => config.with_wsse_pwd(value),
            Self::ConnectionTimeout => config.with_connection_timeout(self.parse_millis(value)?),
            Self::ReceiveTimeout => config.with_receive_timeout(self.parse_millis(value)?),
            Self::InLogger => config.with_in_logger(Arc::new(TracingLogger::named(value))),
            Self::OutLogger => config.with_out_logger(Arc::new(TracingLogger::named(value))),
            Self::Logger => config.with_logger(Arc::new(TracingLogger::named(value))),
            Self::Servers => config.with_servers(split_servers(value)),
            Self::UseMock => config.with_use_mock(self.parse_bool(value)?),
        };

        Ok(configured)
    }

    fn parse_millis(&self, value: &str) -> Result<u64> {
        value
            .trim()
            .parse::<u64>()
            .map_err(|e| ClientError::configuration(self.name(), value, e))
    }

    fn parse_bool(&self, value: &str) -> Result<bool> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ClientError::configuration(
                self.name(),
                value,
                "expected 'true' or 'false'",
            )),
        }
    }

    fn redact<'a>(&self, value: &'a str) -> &'a str {
        match self {
            Self::WssePwd => "***",
            _ => value,
        }
    }
}

/// Split a comma-separated server list, trimming entries and dropping empty ones.
pub fn split_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl ClientConfiguration {
    /// Apply every recognized `<prefix>.<option>` entry of a property map.
    ///
    /// Unknown keys are ignored; a value that fails to convert aborts with a
    /// configuration error.
    pub fn populate_from_properties(
        &self,
        prefix: &str,
        properties: &HashMap<String, String>,
    ) -> Result<ClientConfiguration> {
        ConfigOption::ALL.iter().try_fold(self.clone(), |config, option| {
            option.apply(&config, properties.get(&option.key(prefix)).map(String::as_str))
        })
    }
}

/// Parse `.properties` content: `key=value` or `key: value` per line, `#` and
/// `!` comments. Later duplicates win.
pub fn parse_properties(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split_at = line.find(['=', ':'])?;
            let key = line[..split_at].trim();
            let value = line[split_at + 1..].trim();
            (!key.is_empty()).then(|| (key.to_string(), value.to_string()))
        })
        .collect()
}

/// Read and parse a `.properties` file.
pub fn load_properties<P: AsRef<Path>>(path: P) -> Result<HashMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_properties(&content))
}
