//! Client wrapper owning the elected port.

use crate::config::ClientConfiguration;
use crate::elector::{Attempt, PortElector};
use crate::error::{ClientError, Result};
use crate::port::{configure_port, BindingProvider, ServiceManager};
use std::sync::Arc;
use tracing::{debug, info};

/// A concrete SOAP service: how to create its ports and how to probe them.
pub trait ServiceDefinition {
    type Manager: ServiceManager;
    type Port: BindingProvider + Send + Sync + 'static;

    /// Create an unconfigured port from a service manager.
    fn new_port(&self, manager: Self::Manager) -> Result<Self::Port>;

    /// Liveness probe run against each candidate port during election.
    fn check_if_port_up(&self, port: &Self::Port) -> Result<()>;
}

enum ElectedPort<P> {
    Live(P),
    Mocked(Arc<P>),
}

impl<P> ElectedPort<P> {
    fn get(&self) -> &P {
        match self {
            Self::Live(port) => port,
            Self::Mocked(port) => port.as_ref(),
        }
    }
}

/// SOAP client bound to one elected port for its whole lifetime.
pub struct SoapClient<S: ServiceDefinition> {
    config: ClientConfiguration,
    definition: S,
    endpoint: String,
    port: Option<ElectedPort<S::Port>>,
    attempts: Vec<Attempt>,
}

impl<S: ServiceDefinition> SoapClient<S> {
    /// Detect the endpoint and elect a port. Election happens exactly once.
    pub fn new(config: ClientConfiguration, definition: S) -> Result<Self> {
        if let Some(mocked) = mocked_port::<S>(&config)? {
            debug!("Using mocked port, election skipped");
            let endpoint = config.endpoint().unwrap_or_default().to_string();
            return Ok(Self {
                config,
                definition,
                endpoint,
                port: Some(ElectedPort::Mocked(mocked)),
                attempts: Vec::new(),
            });
        }

        let endpoint = detect_endpoint(&config, &definition)?;

        let election = PortElector::new(&endpoint, config.servers()).elect(
            |template, server| {
                let manager = instantiate(S::Manager::new_without_endpoint())?;
                let mut port = definition.new_port(manager)?;
                configure_port(port.binding_mut(), &config, template, server)?;
                Ok(port)
            },
            |port| definition.check_if_port_up(port),
        )?;

        info!(
            endpoint = %endpoint,
            elected = election.is_elected(),
            server = ?election.elected_server(),
            "Client initialized"
        );

        Ok(Self {
            config,
            definition,
            endpoint,
            port: election.port.map(ElectedPort::Live),
            attempts: election.attempts,
        })
    }

    /// The elected port, `None` if no candidate answered.
    pub fn service(&self) -> Option<&S::Port> {
        self.port.as_ref().map(ElectedPort::get)
    }

    /// The elected port, or [`ClientError::NoLivePort`].
    pub fn require_service(&self) -> Result<&S::Port> {
        self.service().ok_or_else(|| {
            PortElector::new(&self.endpoint, self.config.servers()).exhausted()
        })
    }

    /// Endpoint template used for election.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn config(&self) -> &ClientConfiguration {
        &self.config
    }

    pub fn definition(&self) -> &S {
        &self.definition
    }

    /// Candidates tried during election, in order.
    pub fn election_attempts(&self) -> &[Attempt] {
        &self.attempts
    }

    pub fn is_mocked(&self) -> bool {
        matches!(self.port, Some(ElectedPort::Mocked(_)))
    }
}

impl ClientConfiguration {
    /// Build a client for a service definition.
    pub fn build<S: ServiceDefinition>(self, definition: S) -> Result<SoapClient<S>> {
        SoapClient::new(self, definition)
    }
}

fn mocked_port<S: ServiceDefinition>(config: &ClientConfiguration) -> Result<Option<Arc<S::Port>>> {
    if !config.use_mock() {
        return Ok(None);
    }

    match config.mocked_port() {
        Some(mocked) => mocked.clone().downcast::<S::Port>().map(Some).map_err(|_| {
            ClientError::InvalidConfig(format!(
                "mocked port is not a {}",
                std::any::type_name::<S::Port>()
            ))
        }),
        None => {
            debug!("useMock set but no mocked port configured, electing a real port");
            Ok(None)
        }
    }
}

/// Surface a failed manager construction as `ServiceManagerInstantiation`,
/// keeping the original error as its source.
fn instantiate<M>(manager: Result<M>) -> Result<M> {
    manager.map_err(|e| match e {
        ClientError::ServiceManagerInstantiation(cause) => ClientError::ServiceManagerInstantiation(cause),
        other => ClientError::service_manager(other),
    })
}

/// Configured endpoint, or the default address of a port built from the
/// service's default manager.
fn detect_endpoint<S: ServiceDefinition>(config: &ClientConfiguration, definition: &S) -> Result<String> {
    if let Some(endpoint) = config.endpoint() {
        return Ok(endpoint.to_string());
    }

    let port = definition.new_port(instantiate(S::Manager::new_default())?)?;
    let endpoint = port.binding().address().map(String::from).ok_or_else(|| {
        ClientError::InvalidConfig(
            "no endpoint configured and the service defines no default address".to_string(),
        )
    })?;

    debug!(endpoint = %endpoint, "Using service default endpoint");
    Ok(endpoint)
}
