//! HTTP transport for SOAP ports.
//!
//! Everything here is synchronous: a send blocks the calling thread until a
//! response arrives or a timeout elapses.

use crate::error::{ClientError, Result};
use reqwest::blocking::{Body, Client};
use reqwest::Method;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// HTTP client policy applied to a port's conduit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpClientPolicy {
    /// Connection timeout in milliseconds, 0 for no limit
    pub connection_timeout_ms: u64,
    /// Receive timeout in milliseconds, 0 for no limit.
    ///
    /// Applied by [`HttpConduit`] as a deadline on the whole exchange
    /// (connect, send, and reading the full response), not as an idle
    /// read timeout between packets.
    pub receive_timeout_ms: u64,
    /// Stream request bodies with chunked transfer encoding
    pub allow_chunking: bool,
}

impl Default for HttpClientPolicy {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 30_000,
            receive_timeout_ms: 60_000,
            allow_chunking: true,
        }
    }
}

impl HttpClientPolicy {
    pub fn new(connection_timeout_ms: u64, receive_timeout_ms: u64) -> Self {
        Self {
            connection_timeout_ms,
            receive_timeout_ms,
            allow_chunking: false,
        }
    }

    fn connection_timeout(&self) -> Option<Duration> {
        (self.connection_timeout_ms > 0).then(|| Duration::from_millis(self.connection_timeout_ms))
    }

    fn request_deadline(&self) -> Option<Duration> {
        (self.receive_timeout_ms > 0).then(|| Duration::from_millis(self.receive_timeout_ms))
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Message transport bound to a port.
pub trait Conduit: Send + Sync {
    /// Replace the client policy (timeouts, chunking).
    fn set_client_policy(&mut self, policy: HttpClientPolicy) -> Result<()>;

    fn client_policy(&self) -> HttpClientPolicy;

    /// Send a request and wait for the response.
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse>;
}

/// [`Conduit`] over a blocking reqwest client.
#[derive(Debug)]
pub struct HttpConduit {
    policy: HttpClientPolicy,
    client: Client,
}

impl HttpConduit {
    pub fn new(policy: HttpClientPolicy) -> Result<Self> {
        Ok(Self {
            policy,
            client: build_client(&policy)?,
        })
    }
}

fn build_client(policy: &HttpClientPolicy) -> Result<Client> {
    let mut builder = Client::builder().timeout(policy.request_deadline());
    if let Some(connect_timeout) = policy.connection_timeout() {
        builder = builder.connect_timeout(connect_timeout);
    }
    Ok(builder.build()?)
}

impl Conduit for HttpConduit {
    fn set_client_policy(&mut self, policy: HttpClientPolicy) -> Result<()> {
        self.client = build_client(&policy)?;
        self.policy = policy;
        Ok(())
    }

    fn client_policy(&self) -> HttpClientPolicy {
        self.policy
    }

    fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        debug!(
            method = %request.method,
            url = %request.url,
            chunked = self.policy.allow_chunking,
            "Sending HTTP request"
        );

        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(ref body) = request.body {
            // A reader body has no known length and goes out chunked; a byte
            // body carries Content-Length.
            let body = if self.policy.allow_chunking {
                Body::new(Cursor::new(body.clone()))
            } else {
                Body::from(body.clone())
            };
            builder = builder.body(body);
        }

        let response = builder.send()?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = response.bytes()?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

/// Map a non-2xx response to an error.
pub fn ensure_success(response: HttpResponse, address: &str) -> Result<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ClientError::HttpStatus {
            status: response.status,
            address: address.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_defaults() {
        let policy = HttpClientPolicy::default();
        assert!(policy.allow_chunking);

        let policy = HttpClientPolicy::new(1000, 3000);
        assert!(!policy.allow_chunking);
        assert_eq!(policy.connection_timeout(), Some(Duration::from_millis(1000)));
        assert_eq!(policy.request_deadline(), Some(Duration::from_millis(3000)));
    }

    #[test]
    fn test_zero_timeout_means_unbounded() {
        let policy = HttpClientPolicy::new(0, 0);
        assert_eq!(policy.connection_timeout(), None);
        assert_eq!(policy.request_deadline(), None);
    }

    #[test]
    fn test_request_headers_case_insensitive() {
        let request = HttpRequest::post("http://localhost/svc", b"<x/>".to_vec())
            .with_header("SOAPAction", "\"urn:Ping\"");
        assert_eq!(request.header("soapaction"), Some("\"urn:Ping\""));
        assert_eq!(request.method, Method::POST);
    }

    #[test]
    fn test_ensure_success() {
        assert!(ensure_success(HttpResponse::new(200, "ok"), "http://a").is_ok());
        let err = ensure_success(HttpResponse::new(503, ""), "http://a").unwrap_err();
        assert!(matches!(err, ClientError::HttpStatus { status: 503, .. }));
    }

    #[test]
    fn test_http_conduit_policy_update() {
        let mut conduit = HttpConduit::new(HttpClientPolicy::default()).unwrap();
        conduit.set_client_policy(HttpClientPolicy::new(100, 200)).unwrap();
        assert_eq!(conduit.client_policy(), HttpClientPolicy::new(100, 200));
    }

    #[test]
    fn test_http_conduit_connection_refused() {
        let conduit = HttpConduit::new(HttpClientPolicy::new(200, 200)).unwrap();
        let result = conduit.send(&HttpRequest::get("http://127.0.0.1:1/svc?wsdl"));
        assert!(matches!(result, Err(ClientError::Http(_))));
    }
}
