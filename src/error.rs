//! Error types for the SOAP client.

use std::fmt;
use thiserror::Error;

/// SOAP client errors.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A configuration value could not be converted.
    #[error("Configuration error: invalid value '{value}' for option '{option}': {message}")]
    Configuration {
        option: String,
        value: String,
        message: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The backing service manager could not be constructed.
    #[error("Failed to instantiate service manager: {0}")]
    ServiceManagerInstantiation(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// No candidate server answered the liveness probe.
    #[error("No live port elected for endpoint '{endpoint}' (servers: {servers:?})")]
    NoLivePort {
        endpoint: String,
        servers: Vec<String>,
    },

    #[error("Liveness probe failed: {0}")]
    ProbeFailed(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Invalid SOAP envelope: {0}")]
    InvalidEnvelope(String),

    #[error("WS-Security error: {0}")]
    WsSecurity(String),

    #[error("SOAP fault: {0}")]
    Fault(SoapFault),

    #[error("HTTP {status} from {address}")]
    HttpStatus { status: u16, address: String },

    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Build a configuration error for an option whose value did not convert.
    pub fn configuration(
        option: impl Into<String>,
        value: impl Into<String>,
        message: impl fmt::Display,
    ) -> Self {
        Self::Configuration {
            option: option.into(),
            value: value.into(),
            message: message.to_string(),
        }
    }

    /// Wrap the root cause of a failed service manager construction.
    pub fn service_manager<E>(cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::ServiceManagerInstantiation(cause.into())
    }
}

/// Client result type.
pub type Result<T> = std::result::Result<T, ClientError>;

/// A SOAP Fault returned by a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SoapFault {
    /// Fault code (`faultcode` in 1.1, `Code/Value` in 1.2)
    pub code: String,
    /// Human-readable reason (`faultstring` in 1.1, `Reason/Text` in 1.2)
    pub reason: String,
    /// Fault actor / role, if the server sent one
    pub actor: Option<String>,
}

impl fmt::Display for SoapFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.reason)
    }
}

pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_display() {
        let err = ClientError::configuration("connectionTimeout", "abc", "invalid digit found in string");
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid value 'abc' for option 'connectionTimeout': invalid digit found in string"
        );
    }

    #[test]
    fn test_service_manager_error_keeps_source() {
        use std::error::Error;

        let err = ClientError::service_manager("no URL constructor");
        assert!(err.to_string().contains("service manager"));
        assert_eq!(err.source().unwrap().to_string(), "no URL constructor");
    }

    #[test]
    fn test_fault_display() {
        let fault = SoapFault {
            code: "soap:Server".to_string(),
            reason: "Database unavailable".to_string(),
            actor: None,
        };
        assert_eq!(
            ClientError::Fault(fault).to_string(),
            "SOAP fault: [soap:Server] Database unavailable"
        );
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b>&\"c'"), "a&lt;b&gt;&amp;&quot;c&apos;");
    }
}
