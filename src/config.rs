//! Client configuration.
//!
//! [`ClientConfiguration`] is an immutable value: every `with_*` call returns a
//! new configuration and leaves the receiver untouched. Only immutable
//! sub-values (logger handles, the mocked port) are shared between copies.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Default connection timeout in milliseconds.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 1000;

/// Default receive timeout in milliseconds.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 3000;

/// Sink receiving formatted SOAP traffic.
pub trait TrafficLogger: Send + Sync {
    /// Logger name, for diagnostics.
    fn name(&self) -> &str;

    /// Record one formatted message at informational level.
    fn info(&self, message: &str);
}

/// [`TrafficLogger`] writing to `tracing` under a named `logger` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingLogger {
    name: String,
}

impl TracingLogger {
    /// Logger emitting under `name` (the value of a `logger` property).
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl TrafficLogger for TracingLogger {
    fn name(&self) -> &str {
        &self.name
    }

    fn info(&self, message: &str) {
        info!(logger = %self.name, "{}", message);
    }
}

/// Shared handle to a traffic logger.
pub type LoggerHandle = Arc<dyn TrafficLogger>;

/// Shared handle to a pre-built port used instead of election.
pub type MockedPort = Arc<dyn Any + Send + Sync>;

/// Configuration consumed by [`crate::SoapClient`].
#[derive(Clone)]
pub struct ClientConfiguration {
    endpoint: Option<String>,
    wsse_user: Option<String>,
    wsse_pwd: Option<String>,
    connection_timeout_ms: u64,
    receive_timeout_ms: u64,
    servers: Vec<String>,
    in_logger: Option<LoggerHandle>,
    out_logger: Option<LoggerHandle>,
    mocked_port: Option<MockedPort>,
    use_mock: bool,
}

impl Default for ClientConfiguration {
    fn default() -> Self {
        Self {
            endpoint: None,
            wsse_user: None,
            wsse_pwd: None,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            servers: Vec::new(),
            in_logger: None,
            out_logger: None,
            mocked_port: None,
            use_mock: false,
        }
    }
}

impl fmt::Debug for ClientConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfiguration")
            .field("endpoint", &self.endpoint)
            .field("wsse_user", &self.wsse_user)
            .field("wsse_pwd", &self.wsse_pwd.as_ref().map(|_| "***"))
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("receive_timeout_ms", &self.receive_timeout_ms)
            .field("servers", &self.servers)
            .field("in_logger", &self.in_logger.as_ref().map(|l| l.name().to_string()))
            .field("out_logger", &self.out_logger.as_ref().map(|l| l.name().to_string()))
            .field("mocked_port", &self.mocked_port.is_some())
            .field("use_mock", &self.use_mock)
            .finish()
    }
}

impl ClientConfiguration {
    /// Create a configuration for an endpoint template and candidate servers.
    pub fn new<I, S>(endpoint: impl Into<String>, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            endpoint: Some(endpoint.into()),
            servers: servers.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Endpoint template, possibly containing `{{server}}`.
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// WSSE username.
    pub fn wsse_user(&self) -> Option<&str> {
        self.wsse_user.as_deref()
    }

    /// WSSE password, sent as PasswordText.
    pub fn wsse_pwd(&self) -> Option<&str> {
        self.wsse_pwd.as_deref()
    }

    /// Username and password, only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.wsse_user().zip(self.wsse_pwd())
    }

    /// Connection timeout in milliseconds, 0 for no limit.
    pub fn connection_timeout_ms(&self) -> u64 {
        self.connection_timeout_ms
    }

    /// Receive timeout in milliseconds, 0 for no limit.
    pub fn receive_timeout_ms(&self) -> u64 {
        self.receive_timeout_ms
    }

    /// Connection timeout as a [`Duration`].
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Receive timeout as a [`Duration`].
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    /// Candidate servers, in probe order.
    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    /// Logger for inbound (response) traffic.
    pub fn in_logger(&self) -> Option<&LoggerHandle> {
        self.in_logger.as_ref()
    }

    /// Logger for outbound (request) traffic.
    pub fn out_logger(&self) -> Option<&LoggerHandle> {
        self.out_logger.as_ref()
    }

    /// Pre-built port used instead of election when [`Self::use_mock`] is set.
    pub fn mocked_port(&self) -> Option<&MockedPort> {
        self.mocked_port.as_ref()
    }

    /// Whether the mocked port replaces election.
    pub fn use_mock(&self) -> bool {
        self.use_mock
    }

    /// Copy with the endpoint template replaced.
    pub fn with_endpoint(&self, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..self.clone()
        }
    }

    /// Copy with both WSSE username and password set.
    pub fn with_credentials(&self, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            wsse_user: Some(username.into()),
            wsse_pwd: Some(password.into()),
            ..self.clone()
        }
    }

    /// Copy with the WSSE username set; WSSE stays off until a password is set too.
    pub fn with_wsse_user(&self, username: impl Into<String>) -> Self {
        Self {
            wsse_user: Some(username.into()),
            ..self.clone()
        }
    }

    /// Copy with the WSSE password set.
    pub fn with_wsse_pwd(&self, password: impl Into<String>) -> Self {
        Self {
            wsse_pwd: Some(password.into()),
            ..self.clone()
        }
    }

    /// Copy with the connection timeout (milliseconds) replaced.
    pub fn with_connection_timeout(&self, timeout_ms: u64) -> Self {
        Self {
            connection_timeout_ms: timeout_ms,
            ..self.clone()
        }
    }

    /// Copy with the receive timeout (milliseconds) replaced.
    pub fn with_receive_timeout(&self, timeout_ms: u64) -> Self {
        Self {
            receive_timeout_ms: timeout_ms,
            ..self.clone()
        }
    }

    /// Copy logging inbound traffic to `logger`.
    pub fn with_in_logger(&self, logger: LoggerHandle) -> Self {
        Self {
            in_logger: Some(logger),
            ..self.clone()
        }
    }

    /// Copy logging outbound traffic to `logger`.
    pub fn with_out_logger(&self, logger: LoggerHandle) -> Self {
        Self {
            out_logger: Some(logger),
            ..self.clone()
        }
    }

    /// Use the same logger for inbound and outbound traffic.
    pub fn with_logger(&self, logger: LoggerHandle) -> Self {
        Self {
            in_logger: Some(logger.clone()),
            out_logger: Some(logger),
            ..self.clone()
        }
    }

    /// Replace the whole candidate server list.
    pub fn with_servers<I, S>(&self, servers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            servers: servers.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    /// Copy carrying a pre-built port. It is only used once `use_mock` is set,
    /// and must be the service's port type.
    pub fn with_mocked_port<P>(&self, port: P) -> Self
    where
        P: Any + Send + Sync,
    {
        Self {
            mocked_port: Some(Arc::new(port)),
            ..self.clone()
        }
    }

    /// Copy with the mock switch set.
    pub fn with_use_mock(&self, use_mock: bool) -> Self {
        Self {
            use_mock,
            ..self.clone()
        }
    }

    /// Load a configuration from YAML settings.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let settings: ClientSettings = serde_yaml::from_str(yaml)?;
        Ok(settings.into_configuration())
    }

    /// Load a configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }
}

/// Serializable form of [`ClientConfiguration`].
///
/// Logger fields name [`TracingLogger`] sinks; `logger` sets both directions
/// and is overridden by `in_logger` / `out_logger` when those are present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Endpoint template, may contain `{{server}}`
    pub endpoint: Option<String>,

    /// WSSE username
    pub wsse_user: Option<String>,

    /// WSSE password (sent as PasswordText)
    pub wsse_pwd: Option<String>,

    /// Connection timeout in milliseconds
    pub connection_timeout_ms: u64,

    /// Receive timeout in milliseconds
    pub receive_timeout_ms: u64,

    /// Candidate servers in probe order
    pub servers: Vec<String>,

    pub logger: Option<String>,
    pub in_logger: Option<String>,
    pub out_logger: Option<String>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            wsse_user: None,
            wsse_pwd: None,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
            servers: Vec::new(),
            logger: None,
            in_logger: None,
            out_logger: None,
        }
    }
}

impl ClientSettings {
    /// Convert to a [`ClientConfiguration`]; logger names become [`TracingLogger`]s.
    pub fn into_configuration(self) -> ClientConfiguration {
        let mut config = ClientConfiguration::default()
            .with_connection_timeout(self.connection_timeout_ms)
            .with_receive_timeout(self.receive_timeout_ms)
            .with_servers(self.servers);

        if let Some(endpoint) = self.endpoint {
            config = config.with_endpoint(endpoint);
        }
        if let Some(user) = self.wsse_user {
            config = config.with_wsse_user(user);
        }
        if let Some(pwd) = self.wsse_pwd {
            config = config.with_wsse_pwd(pwd);
        }
        if let Some(name) = self.logger {
            config = config.with_logger(Arc::new(TracingLogger::named(name)));
        }
        if let Some(name) = self.in_logger {
            config = config.with_in_logger(Arc::new(TracingLogger::named(name)));
        }
        if let Some(name) = self.out_logger {
            config = config.with_out_logger(Arc::new(TracingLogger::named(name)));
        }

        config
    }
}
