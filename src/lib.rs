//! SOAP client builder with failover port election
//!
//! Builds SOAP client ports from an immutable configuration, applies
//! transport and security settings to each port, and elects the first live
//! port among a list of candidate servers.
//!
//! # Features
//!
//! - Immutable `with_*` configuration, populated from properties or YAML
//! - Endpoint templates with a `{{server}}` placeholder
//! - Ordered failover election with a per-service liveness probe
//! - WS-Security UsernameToken (PasswordText) injection
//! - Inbound / outbound traffic logging through `tracing`
//! - Connection and receive timeouts per port
//! - Mocked ports for tests
//!
//! # Example
//!
//! ```ignore
//! use zentinel_soap_client::{ClientConfiguration, SoapClient};
//!
//! let config = ClientConfiguration::new("http://{{server}}:8080/billing", ["node-a", "node-b"])
//!     .with_credentials("billing", "secret")
//!     .with_receive_timeout(5000);
//!
//! let client = SoapClient::new(config, BillingService)?;
//! let port = client.require_service()?;
//! ```

pub mod client;
pub mod config;
pub mod elector;
pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod port;
pub mod properties;
pub mod transport;
pub mod wsse;

pub use client::{ServiceDefinition, SoapClient};
pub use config::{ClientConfiguration, ClientSettings, LoggerHandle, TracingLogger, TrafficLogger};
pub use elector::{PortElector, SERVER_PLACEHOLDER};
pub use error::{ClientError, Result, SoapFault};
pub use port::{BindingProvider, PortBinding, ServiceManager, SoapResponse};
pub use properties::ConfigOption;
