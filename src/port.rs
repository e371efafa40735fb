//! Client ports: the binding behind a service port and its configuration.

use crate::config::{ClientConfiguration, LoggerHandle};
use crate::elector::substitute_server;
use crate::envelope::{parse_soap_envelope, quote_soap_action, SoapEnvelope, SoapVersion};
use crate::error::{ClientError, Result};
use crate::interceptor::{Interceptor, InterceptorChain, LoggingInterceptor, SoapMessage};
use crate::transport::{ensure_success, Conduit, HttpClientPolicy, HttpConduit, HttpRequest};
use crate::wsse::UsernameTokenInterceptor;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Result of a successful SOAP invocation.
#[derive(Debug, Clone)]
pub struct SoapResponse {
    pub status: u16,
    /// `None` for an empty (one-way / 202) response
    pub envelope: Option<SoapEnvelope>,
}

impl SoapResponse {
    /// Raw body content of the response envelope.
    pub fn body(&self) -> Option<&str> {
        self.envelope.as_ref().map(|e| e.body.content.as_str())
    }
}

/// The toolkit side of a client port: address, interceptors and conduit.
pub struct PortBinding {
    address: Option<String>,
    version: SoapVersion,
    out_chain: InterceptorChain,
    in_chain: InterceptorChain,
    conduit: Box<dyn Conduit>,
}

impl PortBinding {
    /// Binding over an HTTP conduit with the default client policy.
    pub fn new(address: Option<String>, version: SoapVersion) -> Result<Self> {
        let conduit = HttpConduit::new(HttpClientPolicy::default())?;
        Ok(Self::with_conduit(address, version, Box::new(conduit)))
    }

    pub fn with_conduit(address: Option<String>, version: SoapVersion, conduit: Box<dyn Conduit>) -> Self {
        Self {
            address,
            version,
            out_chain: InterceptorChain::new(),
            in_chain: InterceptorChain::new(),
            conduit,
        }
    }

    pub fn address(&self) -> Option<&str> {
        self.address.as_deref()
    }

    pub fn set_address(&mut self, address: impl Into<String>) {
        self.address = Some(address.into());
    }

    pub fn version(&self) -> SoapVersion {
        self.version
    }

    pub fn out_interceptors(&self) -> &InterceptorChain {
        &self.out_chain
    }

    pub fn in_interceptors(&self) -> &InterceptorChain {
        &self.in_chain
    }

    pub fn add_out_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.out_chain.add(interceptor);
    }

    pub fn add_in_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.in_chain.add(interceptor);
    }

    pub fn client_policy(&self) -> HttpClientPolicy {
        self.conduit.client_policy()
    }

    pub fn set_client_policy(&mut self, policy: HttpClientPolicy) -> Result<()> {
        self.conduit.set_client_policy(policy)
    }

    fn require_address(&self) -> Result<&str> {
        self.address
            .as_deref()
            .ok_or_else(|| ClientError::InvalidConfig("port has no endpoint address".to_string()))
    }

    /// Invoke one SOAP operation with a pre-rendered body payload.
    pub fn invoke(&self, soap_action: &str, payload: &str) -> Result<SoapResponse> {
        let address = self.require_address()?;
        let action = (!soap_action.is_empty()).then_some(soap_action);

        let mut outbound = SoapMessage::outbound(address, self.version, action, payload);
        self.out_chain.run(&mut outbound)?;

        let mut request = HttpRequest::post(address, outbound.payload().into_bytes())
            .with_header("Content-Type", self.version.content_type(action));
        if self.version == SoapVersion::Soap11 {
            request = request.with_header("SOAPAction", quote_soap_action(soap_action));
        }

        let response = self.conduit.send(&request)?;
        let status = response.status;
        let content = response.text();

        let mut inbound = SoapMessage::inbound(address, self.version, status, content);
        self.in_chain.run(&mut inbound)?;
        let content = inbound.payload();

        if content.trim().is_empty() {
            ensure_success(response, address)?;
            return Ok(SoapResponse {
                status,
                envelope: None,
            });
        }

        let envelope = parse_soap_envelope(content.as_bytes())?;
        if let Some(fault) = envelope.fault.clone() {
            debug!(address = %address, status, fault = %fault, "SOAP fault received");
            return Err(ClientError::Fault(fault));
        }
        ensure_success(response, address)?;

        Ok(SoapResponse {
            status,
            envelope: Some(envelope),
        })
    }

    /// Fetch the service description (`GET <address>?wsdl`).
    pub fn fetch_wsdl(&self) -> Result<String> {
        let address = self.require_address()?;
        let separator = if address.contains('?') { '&' } else { '?' };
        let url = format!("{}{}wsdl", address, separator);

        let response = ensure_success(self.conduit.send(&HttpRequest::get(&url))?, &url)?;
        Ok(response.text())
    }
}

impl fmt::Debug for PortBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortBinding")
            .field("address", &self.address)
            .field("version", &self.version)
            .field("out_interceptors", &self.out_chain)
            .field("in_interceptors", &self.in_chain)
            .field("policy", &self.conduit.client_policy())
            .finish()
    }
}

/// Typed service ports expose their binding through this trait.
pub trait BindingProvider {
    fn binding(&self) -> &PortBinding;
    fn binding_mut(&mut self) -> &mut PortBinding;
}

impl BindingProvider for PortBinding {
    fn binding(&self) -> &PortBinding {
        self
    }

    fn binding_mut(&mut self) -> &mut PortBinding {
        self
    }
}

/// Backing connection object handed to [`crate::ServiceDefinition::new_port`].
///
/// Construction failures are reported by the client as
/// [`ClientError::ServiceManagerInstantiation`].
pub trait ServiceManager: Sized {
    /// Manager bound to the service's default address.
    fn new_default() -> Result<Self>;

    /// Manager with no endpoint bound; the address is set per port.
    fn new_without_endpoint() -> Result<Self>;
}

/// Applies client settings to a port binding.
pub struct PortConfigurer<'a> {
    binding: &'a mut PortBinding,
}

impl<'a> PortConfigurer<'a> {
    pub fn new(binding: &'a mut PortBinding) -> Self {
        Self { binding }
    }

    /// Bind the endpoint with the first `{{server}}` replaced by `server`.
    pub fn configure_endpoint(&mut self, endpoint: &str, server: &str) {
        self.binding.set_address(substitute_server(endpoint, server));
    }

    pub fn configure_wsse(&mut self, wsse_user: &str, wsse_pwd: &str) {
        self.binding
            .add_out_interceptor(Arc::new(UsernameTokenInterceptor::for_credentials(wsse_user, wsse_pwd)));
    }

    pub fn configure_in_logger(&mut self, logger: LoggerHandle) {
        self.binding
            .add_in_interceptor(Arc::new(LoggingInterceptor::inbound(logger)));
    }

    pub fn configure_out_logger(&mut self, logger: LoggerHandle) {
        self.binding
            .add_out_interceptor(Arc::new(LoggingInterceptor::outbound(logger)));
    }

    /// Connection and receive timeouts; request chunking is disabled.
    pub fn configure_timeouts(&mut self, connection_timeout_ms: u64, receive_timeout_ms: u64) -> Result<()> {
        self.binding
            .set_client_policy(HttpClientPolicy::new(connection_timeout_ms, receive_timeout_ms))
    }
}

/// Configure a binding from a client configuration for one candidate server.
///
/// Order: endpoint, WS-Security (only with both credentials), loggers, timeouts.
pub fn configure_port(
    binding: &mut PortBinding,
    config: &ClientConfiguration,
    endpoint: &str,
    server: &str,
) -> Result<()> {
    let mut configurer = PortConfigurer::new(binding);

    configurer.configure_endpoint(endpoint, server);

    if let Some((user, pwd)) = config.credentials() {
        configurer.configure_wsse(user, pwd);
    }
    if let Some(logger) = config.in_logger() {
        configurer.configure_in_logger(logger.clone());
    }
    if let Some(logger) = config.out_logger() {
        configurer.configure_out_logger(logger.clone());
    }

    configurer.configure_timeouts(config.connection_timeout_ms(), config.receive_timeout_ms())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TracingLogger;
    use crate::transport::HttpResponse;
    use std::sync::Mutex;

    /// Conduit answering every request with a fixed response.
    struct FixedConduit {
        policy: HttpClientPolicy,
        response: HttpResponse,
        sent: Arc<Mutex<Vec<HttpRequest>>>,
    }

    impl FixedConduit {
        fn new(response: HttpResponse) -> (Self, Arc<Mutex<Vec<HttpRequest>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            let conduit = Self {
                policy: HttpClientPolicy::default(),
                response,
                sent: sent.clone(),
            };
            (conduit, sent)
        }
    }

    impl Conduit for FixedConduit {
        fn set_client_policy(&mut self, policy: HttpClientPolicy) -> Result<()> {
            self.policy = policy;
            Ok(())
        }

        fn client_policy(&self) -> HttpClientPolicy {
            self.policy
        }

        fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.sent.lock().unwrap().push(request.clone());
            Ok(self.response.clone())
        }
    }

    const OK_RESPONSE: &str = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><PingResponse>pong</PingResponse></soap:Body></soap:Envelope>"#;

    fn binding_with(response: HttpResponse) -> (PortBinding, Arc<Mutex<Vec<HttpRequest>>>) {
        let (conduit, sent) = FixedConduit::new(response);
        let binding = PortBinding::with_conduit(None, SoapVersion::Soap11, Box::new(conduit));
        (binding, sent)
    }

    #[test]
    fn test_configure_port_full() {
        let (mut binding, _) = binding_with(HttpResponse::new(200, OK_RESPONSE));
        let config = ClientConfiguration::new("http://{{server}}/svc", ["host1"])
            .with_credentials("alice", "secret")
            .with_logger(Arc::new(TracingLogger::named("soap")))
            .with_connection_timeout(150)
            .with_receive_timeout(450);

        configure_port(&mut binding, &config, "http://{{server}}/svc", "host1").unwrap();

        assert_eq!(binding.address(), Some("http://host1/svc"));
        assert_eq!(binding.out_interceptors().ids(), vec!["wsse-username-token", "logging-out"]);
        assert_eq!(binding.in_interceptors().ids(), vec!["logging-in"]);
        assert_eq!(binding.client_policy(), HttpClientPolicy::new(150, 450));
        assert!(!binding.client_policy().allow_chunking);
    }

    #[test]
    fn test_no_wsse_without_both_credentials() {
        let (mut binding, _) = binding_with(HttpResponse::new(200, OK_RESPONSE));
        let config = ClientConfiguration::new("http://svc", Vec::<String>::new()).with_wsse_user("alice");

        configure_port(&mut binding, &config, "http://svc", "").unwrap();

        assert!(binding.out_interceptors().is_empty());
        assert!(binding.in_interceptors().is_empty());
    }

    #[test]
    fn test_invoke_sends_envelope_and_parses_response() {
        let (mut binding, sent) = binding_with(HttpResponse::new(200, OK_RESPONSE));
        binding.set_address("http://host1/svc");

        let response = binding.invoke("urn:Ping", "<Ping/>").unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body(), Some("<PingResponse>pong</PingResponse>"));

        let sent = sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://host1/svc");
        assert_eq!(sent[0].header("SOAPAction"), Some("\"urn:Ping\""));
        assert_eq!(sent[0].header("Content-Type"), Some("text/xml; charset=utf-8"));
        let body = String::from_utf8(sent[0].body.clone().unwrap()).unwrap();
        assert!(body.contains("<soap:Body><Ping/></soap:Body>"));
    }

    #[test]
    fn test_invoke_maps_fault() {
        let fault = r#"<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body><soap:Fault><faultcode>soap:Client</faultcode><faultstring>Unknown account</faultstring></soap:Fault></soap:Body></soap:Envelope>"#;
        let (mut binding, _) = binding_with(HttpResponse::new(500, fault));
        binding.set_address("http://host1/svc");

        let err = binding.invoke("urn:Charge", "<Charge/>").unwrap_err();
        match err {
            ClientError::Fault(fault) => assert_eq!(fault.reason, "Unknown account"),
            other => panic!("expected fault, got {:?}", other),
        }
    }

    #[test]
    fn test_invoke_empty_accepted_response() {
        let (mut binding, _) = binding_with(HttpResponse::new(202, ""));
        binding.set_address("http://host1/svc");
        let response = binding.invoke("urn:Notify", "<Notify/>").unwrap();
        assert!(response.envelope.is_none());
    }

    #[test]
    fn test_invoke_http_error_without_envelope() {
        let (mut binding, _) = binding_with(HttpResponse::new(503, ""));
        binding.set_address("http://host1/svc");
        let err = binding.invoke("urn:Ping", "<Ping/>").unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
    }

    #[test]
    fn test_invoke_without_address_fails() {
        let (binding, sent) = binding_with(HttpResponse::new(200, OK_RESPONSE));
        assert!(matches!(
            binding.invoke("urn:Ping", "<Ping/>"),
            Err(ClientError::InvalidConfig(_))
        ));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_wsdl_url() {
        let (mut binding, sent) = binding_with(HttpResponse::new(200, "<definitions/>"));
        binding.set_address("http://host1/svc");
        assert_eq!(binding.fetch_wsdl().unwrap(), "<definitions/>");
        assert_eq!(sent.lock().unwrap()[0].url, "http://host1/svc?wsdl");
    }

    #[test]
    fn test_soap_12_action_in_content_type() {
        let (conduit, sent) = FixedConduit::new(HttpResponse::new(202, ""));
        let binding = PortBinding::with_conduit(
            Some("http://host1/svc".to_string()),
            SoapVersion::Soap12,
            Box::new(conduit),
        );
        binding.invoke("urn:Ping", "<Ping/>").unwrap();

        let sent = sent.lock().unwrap();
        assert!(sent[0].header("SOAPAction").is_none());
        assert_eq!(
            sent[0].header("Content-Type"),
            Some("application/soap+xml; charset=utf-8; action=\"urn:Ping\"")
        );
    }
}
