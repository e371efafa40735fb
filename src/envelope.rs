//! SOAP envelope serialization and parsing.
//!
//! Uses quick-xml's namespace-aware reader, which never expands external
//! entities. DOCTYPE and ENTITY declarations are rejected up front anyway:
//! a SOAP message must not carry a DTD.

use crate::error::{ClientError, Result, SoapFault};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;

/// SOAP namespace URIs.
pub const SOAP_11_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const SOAP_12_NS: &str = "http://www.w3.org/2003/05/soap-envelope";
pub const WSSE_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd";
pub const WSU_NS: &str = "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-utility-1.0.xsd";

/// SOAP versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoapVersion {
    /// SOAP 1.1 (namespace: http://schemas.xmlsoap.org/soap/envelope/)
    #[default]
    Soap11,
    /// SOAP 1.2 (namespace: http://www.w3.org/2003/05/soap-envelope)
    Soap12,
}

impl SoapVersion {
    /// Envelope namespace URI for this version.
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Soap11 => SOAP_11_NS,
            Self::Soap12 => SOAP_12_NS,
        }
    }

    /// Detect the version from an envelope namespace URI.
    pub fn from_namespace(ns: &str) -> Option<Self> {
        match ns {
            SOAP_11_NS => Some(Self::Soap11),
            SOAP_12_NS => Some(Self::Soap12),
            _ => None,
        }
    }

    /// HTTP Content-Type for a request. SOAP 1.2 carries the action as a
    /// media type parameter instead of a `SOAPAction` header.
    pub fn content_type(&self, action: Option<&str>) -> String {
        match (self, action) {
            (Self::Soap11, _) => "text/xml; charset=utf-8".to_string(),
            (Self::Soap12, Some(action)) if !action.is_empty() => {
                format!("application/soap+xml; charset=utf-8; action=\"{}\"", action)
            }
            (Self::Soap12, _) => "application/soap+xml; charset=utf-8".to_string(),
        }
    }
}

/// Parsed SOAP envelope.
#[derive(Debug, Clone)]
pub struct SoapEnvelope {
    /// Detected SOAP version
    pub version: SoapVersion,
    /// SOAP Header (if present)
    pub header: Option<SoapHeader>,
    /// SOAP Body
    pub body: SoapBody,
    /// SOAP Fault carried in the body, if any
    pub fault: Option<SoapFault>,
}

/// Parsed SOAP Header.
#[derive(Debug, Clone, Default)]
pub struct SoapHeader {
    /// WS-Security header (if present)
    pub security: Option<WsSecurityHeader>,
    /// All other header elements
    pub elements: Vec<HeaderElement>,
}

/// A generic header element.
#[derive(Debug, Clone)]
pub struct HeaderElement {
    /// Element local name
    pub local_name: String,
    /// Element namespace URI
    pub namespace: Option<String>,
}

/// Parsed WS-Security header.
#[derive(Debug, Clone, Default)]
pub struct WsSecurityHeader {
    /// Username token
    pub username_token: Option<UsernameToken>,
}

/// WS-Security UsernameToken.
#[derive(Debug, Clone, Default)]
pub struct UsernameToken {
    /// Username
    pub username: String,
    /// Password as carried on the wire
    pub password: Option<String>,
    /// Password type URI
    pub password_type: Option<String>,
    /// Created timestamp
    pub created: Option<String>,
}

/// Parsed SOAP Body.
#[derive(Debug, Clone, Default)]
pub struct SoapBody {
    /// First child element name (the operation or response wrapper)
    pub operation: Option<String>,
    /// Namespace of the first child element
    pub operation_namespace: Option<String>,
    /// Raw XML between `<Body>` and `</Body>`, trimmed
    pub content: String,
}

/// Serialize a request envelope from pre-rendered header blocks and body payload.
pub fn build_envelope(version: SoapVersion, header_blocks: &[String], body: &str) -> String {
    let header = if header_blocks.is_empty() {
        String::new()
    } else {
        format!("<soap:Header>{}</soap:Header>", header_blocks.concat())
    };

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><soap:Envelope xmlns:soap="{}">{}<soap:Body>{}</soap:Body></soap:Envelope>"#,
        version.namespace(),
        header,
        body
    )
}

/// Parse raw bytes as a SOAP envelope.
pub fn parse_soap_envelope(data: &[u8]) -> Result<SoapEnvelope> {
    let xml_str = std::str::from_utf8(data)
        .map_err(|e| ClientError::XmlParse(format!("Invalid UTF-8: {}", e)))?;

    check_xxe_patterns(xml_str)?;

    let mut reader = NsReader::from_str(xml_str);
    reader.config_mut().trim_text(true);

    let mut state = EnvelopeState::default();
    let mut body_start: Option<usize> = None;
    let mut buf = Vec::new();

    loop {
        let position = reader.buffer_position() as usize;
        let (resolved, event) = reader
            .read_resolved_event_into(&mut buf)
            .map_err(|e| ClientError::XmlParse(format!("XML parse error at {}: {}", position, e)))?;
        let ns = namespace_of(&resolved);

        match event {
            Event::Start(ref e) => {
                let local_name = local_name_str(e);
                let is_body = state.is_envelope_child() && local_name == "Body";
                state.open(e, local_name, ns);
                if is_body {
                    body_start = Some(reader.buffer_position() as usize);
                }
            }

            Event::Empty(ref e) => {
                // Self-closing tags like <GetStatus/> or <soap:Body/>
                let local_name = local_name_str(e);
                state.open(e, local_name, ns);
                state.close();
            }

            Event::End(_) => {
                if let Some("Body") = state.close().as_deref() {
                    if state.path.len() == 1 {
                        if let Some(start) = body_start.take() {
                            state.body.content = xml_str[start..position].trim().to_string();
                        }
                    }
                }
            }

            Event::Text(ref e) => {
                let text = e
                    .unescape()
                    .map_err(|e| ClientError::XmlParse(format!("Invalid text content: {}", e)))?;
                state.text(&text);
            }

            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                state.text(&text);
            }

            Event::Eof => break,

            _ => {}
        }

        buf.clear();
    }

    let version = state.version.ok_or_else(|| {
        ClientError::InvalidEnvelope(
            "No valid SOAP Envelope found with recognized namespace".to_string(),
        )
    })?;

    if !state.body_seen {
        return Err(ClientError::InvalidEnvelope(
            "SOAP Body element is missing".to_string(),
        ));
    }

    Ok(SoapEnvelope {
        version,
        header: state.header,
        body: state.body,
        fault: state.fault,
    })
}

/// Element bookkeeping while walking an envelope.
#[derive(Default)]
struct EnvelopeState {
    version: Option<SoapVersion>,
    path: Vec<String>,
    header: Option<SoapHeader>,
    in_security: bool,
    body_seen: bool,
    body: SoapBody,
    fault: Option<SoapFault>,
}

impl EnvelopeState {
    fn is_envelope_child(&self) -> bool {
        self.version.is_some() && self.path.len() == 1
    }

    fn open(&mut self, e: &BytesStart, local_name: String, ns: Option<String>) {
        let depth = self.path.len();
        let parent = self.path.get(1).cloned();

        match depth {
            0 => {
                if local_name == "Envelope" {
                    self.version = ns.as_deref().and_then(SoapVersion::from_namespace);
                }
            }
            1 if self.version.is_some() => match local_name.as_str() {
                "Header" => self.header = Some(SoapHeader::default()),
                "Body" => self.body_seen = true,
                _ => {}
            },
            2 if parent.as_deref() == Some("Header") => {
                if let Some(header) = self.header.as_mut() {
                    if local_name == "Security" && ns.as_deref() == Some(WSSE_NS) {
                        self.in_security = true;
                        header.security = Some(WsSecurityHeader::default());
                    } else {
                        header.elements.push(HeaderElement {
                            local_name: local_name.clone(),
                            namespace: ns.clone(),
                        });
                    }
                }
            }
            2 if parent.as_deref() == Some("Body") => {
                if self.body.operation.is_none() {
                    self.body.operation = Some(local_name.clone());
                    self.body.operation_namespace = ns.clone();

                    let envelope_ns = self.version.map(|v| v.namespace());
                    if local_name == "Fault" && ns.as_deref() == envelope_ns {
                        self.fault = Some(SoapFault::default());
                    }
                }
            }
            3 if self.in_security && local_name == "UsernameToken" => {
                if let Some(security) = self.security_mut() {
                    security.username_token = Some(UsernameToken::default());
                }
            }
            4 if self.in_security && local_name == "Password" => {
                let password_type = get_attribute(e, "Type");
                if let Some(token) = self.username_token_mut() {
                    token.password_type = password_type;
                }
            }
            _ => {}
        }

        self.path.push(local_name);
    }

    fn close(&mut self) -> Option<String> {
        let closed = self.path.pop();
        if self.path.len() == 2 && closed.as_deref() == Some("Security") {
            self.in_security = false;
        }
        closed
    }

    fn text(&mut self, text: &str) {
        let owned = self.path.clone();
        let path: Vec<&str> = owned.iter().map(String::as_str).collect();
        let text = text.to_string();

        match path.as_slice() {
            [_, "Header", "Security", "UsernameToken", field] if self.in_security => {
                if let Some(token) = self.username_token_mut() {
                    match *field {
                        "Username" => token.username = text,
                        "Password" => token.password = Some(text),
                        "Created" => token.created = Some(text),
                        _ => {}
                    }
                }
            }
            [_, "Body", "Fault", rest @ ..] => {
                if let Some(fault) = self.fault.as_mut() {
                    match rest {
                        ["faultcode"] | ["Code", "Value"] => fault.code = text,
                        ["faultstring"] => fault.reason = text,
                        ["Reason", "Text"] if fault.reason.is_empty() => fault.reason = text,
                        ["faultactor"] | ["Role"] => fault.actor = Some(text),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    fn security_mut(&mut self) -> Option<&mut WsSecurityHeader> {
        self.header.as_mut().and_then(|h| h.security.as_mut())
    }

    fn username_token_mut(&mut self) -> Option<&mut UsernameToken> {
        self.security_mut().and_then(|s| s.username_token.as_mut())
    }
}

/// Check for XXE attack patterns.
fn check_xxe_patterns(xml: &str) -> Result<()> {
    if xml.contains("<!DOCTYPE") || xml.contains("<!doctype") {
        return Err(ClientError::InvalidEnvelope(
            "DOCTYPE declarations are not allowed".to_string(),
        ));
    }

    if xml.contains("<!ENTITY") || xml.contains("<!entity") {
        return Err(ClientError::InvalidEnvelope(
            "Entity declarations are not allowed".to_string(),
        ));
    }

    Ok(())
}

fn namespace_of(resolved: &ResolveResult) -> Option<String> {
    match resolved {
        ResolveResult::Bound(ns) => std::str::from_utf8(ns.as_ref()).ok().map(String::from),
        _ => None,
    }
}

/// Extract local name from element.
fn local_name_str(e: &BytesStart) -> String {
    let name = e.local_name();
    std::str::from_utf8(name.as_ref()).unwrap_or("").to_string()
}

/// Look up an attribute by local name.
fn get_attribute(e: &BytesStart, local_name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|attr| attr.key.local_name().as_ref() == local_name.as_bytes())
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

/// Quote a SOAPAction header value.
pub fn quote_soap_action(action: &str) -> String {
    format!("\"{}\"", action.trim().trim_matches('"'))
}
