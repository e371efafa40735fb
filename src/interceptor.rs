//! Interceptor chains for outbound and inbound SOAP messages.

use crate::config::LoggerHandle;
use crate::envelope::{build_envelope, SoapVersion};
use crate::error::Result;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static MESSAGE_IDS: AtomicU64 = AtomicU64::new(1);

/// Message direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outbound,
    Inbound,
}

/// Chain phase. Interceptors run in phase order, insertion order within a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Header manipulation (WS-Security)
    PreProtocol,
    /// Message fully assembled (logging)
    PreStream,
}

/// A SOAP message travelling through an interceptor chain.
#[derive(Debug, Clone)]
pub struct SoapMessage {
    pub id: u64,
    pub direction: Direction,
    pub address: String,
    pub version: SoapVersion,
    pub soap_action: Option<String>,
    /// Rendered header blocks (outbound)
    pub header_blocks: Vec<String>,
    /// Body payload (outbound)
    pub body: String,
    /// HTTP status (inbound)
    pub response_code: Option<u16>,
    /// Raw received content (inbound)
    pub content: Option<String>,
}

impl SoapMessage {
    pub fn outbound(
        address: impl Into<String>,
        version: SoapVersion,
        soap_action: Option<&str>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: MESSAGE_IDS.fetch_add(1, Ordering::Relaxed),
            direction: Direction::Outbound,
            address: address.into(),
            version,
            soap_action: soap_action.map(String::from),
            header_blocks: Vec::new(),
            body: body.into(),
            response_code: None,
            content: None,
        }
    }

    pub fn inbound(
        address: impl Into<String>,
        version: SoapVersion,
        response_code: u16,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MESSAGE_IDS.fetch_add(1, Ordering::Relaxed),
            direction: Direction::Inbound,
            address: address.into(),
            version,
            soap_action: None,
            header_blocks: Vec::new(),
            body: String::new(),
            response_code: Some(response_code),
            content: Some(content.into()),
        }
    }

    pub fn add_header_block(&mut self, block: impl Into<String>) {
        self.header_blocks.push(block.into());
    }

    /// Wire payload: the received content inbound, the serialized envelope outbound.
    pub fn payload(&self) -> String {
        match (&self.direction, &self.content) {
            (Direction::Inbound, Some(content)) => content.clone(),
            _ => build_envelope(self.version, &self.header_blocks, &self.body),
        }
    }
}

/// A hook in a port's message pipeline.
pub trait Interceptor: Send + Sync {
    /// Identifier, for diagnostics.
    fn id(&self) -> &str;

    fn phase(&self) -> Phase;

    fn handle_message(&self, message: &mut SoapMessage) -> Result<()>;
}

/// Ordered interceptors for one direction.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert after every interceptor of the same or an earlier phase.
    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        let phase = interceptor.phase();
        let at = self
            .interceptors
            .iter()
            .position(|existing| existing.phase() > phase)
            .unwrap_or(self.interceptors.len());
        self.interceptors.insert(at, interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn ids(&self) -> Vec<&str> {
        self.interceptors.iter().map(|i| i.id()).collect()
    }

    /// Run every interceptor; the first error aborts the chain.
    pub fn run(&self, message: &mut SoapMessage) -> Result<()> {
        for interceptor in &self.interceptors {
            interceptor.handle_message(message)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

/// Forwards formatted traffic to a [`crate::TrafficLogger`].
pub struct LoggingInterceptor {
    direction: Direction,
    logger: LoggerHandle,
}

impl LoggingInterceptor {
    pub fn inbound(logger: LoggerHandle) -> Self {
        Self {
            direction: Direction::Inbound,
            logger,
        }
    }

    pub fn outbound(logger: LoggerHandle) -> Self {
        Self {
            direction: Direction::Outbound,
            logger,
        }
    }
}

impl Interceptor for LoggingInterceptor {
    fn id(&self) -> &str {
        match self.direction {
            Direction::Inbound => "logging-in",
            Direction::Outbound => "logging-out",
        }
    }

    fn phase(&self) -> Phase {
        Phase::PreStream
    }

    fn handle_message(&self, message: &mut SoapMessage) -> Result<()> {
        self.logger.info(&format_message(message));
        Ok(())
    }
}

/// Render a message the way it is written to traffic logs.
pub fn format_message(message: &SoapMessage) -> String {
    let mut out = String::new();
    let title = match message.direction {
        Direction::Outbound => "Outbound Message",
        Direction::Inbound => "Inbound Message",
    };

    let _ = writeln!(out, "{}", title);
    let _ = writeln!(out, "---------------------------");
    let _ = writeln!(out, "ID: {}", message.id);
    if let Some(code) = message.response_code {
        let _ = writeln!(out, "Response-Code: {}", code);
    }
    let _ = writeln!(out, "Address: {}", message.address);
    let _ = writeln!(out, "Encoding: UTF-8");
    let _ = writeln!(
        out,
        "Content-Type: {}",
        message.version.content_type(message.soap_action.as_deref())
    );
    if let Some(ref action) = message.soap_action {
        let _ = writeln!(out, "SOAPAction: {}", action);
    }
    let _ = writeln!(out, "Payload: {}", message.payload());
    out.push_str("--------------------------------------");
    out
}
