//! Zentinel SOAP probe binary.
//!
//! Run with: `zentinel-soap-probe --properties client.properties --prefix billing`
//!
//! Elects a live port for the configured endpoint and optionally invokes one
//! operation on it.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;
use zentinel_soap_client::envelope::SoapVersion;
use zentinel_soap_client::properties::load_properties;
use zentinel_soap_client::{
    ClientConfiguration, PortBinding, ServiceDefinition, ServiceManager, SoapClient,
};

/// SOAP endpoint probe for Zentinel services.
///
/// Tries each candidate server in order, substituting it for `{{server}}` in
/// the endpoint, and keeps the first one whose WSDL can be fetched.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to client settings (YAML)
    #[arg(short, long, default_value = "client.yaml")]
    config: PathBuf,

    /// Path to a properties file applied on top of the YAML settings
    #[arg(short, long)]
    properties: Option<PathBuf>,

    /// Property key prefix (e.g. "billing" for "billing.endpoint")
    #[arg(long, default_value = "soap")]
    prefix: String,

    /// SOAPAction of an operation to invoke on the elected port
    #[arg(short, long)]
    action: Option<String>,

    /// File holding the body payload for --action
    #[arg(long, requires = "action")]
    payload: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

/// Services probed by this binary define no default address.
struct ProbeManager {
    version: SoapVersion,
}

impl ServiceManager for ProbeManager {
    fn new_default() -> zentinel_soap_client::Result<Self> {
        Self::new_without_endpoint()
    }

    fn new_without_endpoint() -> zentinel_soap_client::Result<Self> {
        Ok(ProbeManager {
            version: SoapVersion::Soap11,
        })
    }
}

/// Any SOAP service that publishes its WSDL.
struct WsdlService;

impl ServiceDefinition for WsdlService {
    type Manager = ProbeManager;
    type Port = PortBinding;

    fn new_port(&self, manager: ProbeManager) -> zentinel_soap_client::Result<PortBinding> {
        PortBinding::new(None, manager.version)
    }

    fn check_if_port_up(&self, port: &PortBinding) -> zentinel_soap_client::Result<()> {
        port.fetch_wsdl().map(|_| ())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Zentinel SOAP probe v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = if args.config.exists() {
        info!("Config file: {}", args.config.display());
        ClientConfiguration::from_yaml_file(&args.config).context("Failed to load config file")?
    } else {
        info!("Config file not found, using defaults");
        ClientConfiguration::default()
    };

    if let Some(ref path) = args.properties {
        let properties = load_properties(path)
            .with_context(|| format!("Failed to read properties file {}", path.display()))?;
        config = config
            .populate_from_properties(&args.prefix, &properties)
            .context("Invalid client properties")?;
    }

    info!(
        endpoint = ?config.endpoint(),
        servers = ?config.servers(),
        wsse = config.credentials().is_some(),
        connection_timeout_ms = config.connection_timeout_ms(),
        receive_timeout_ms = config.receive_timeout_ms(),
        "Configuration loaded"
    );

    let client = SoapClient::new(config, WsdlService).context("Failed to build client")?;
    let port = client.require_service()?;
    let address = port.address().unwrap_or_default();

    info!(address = %address, attempts = client.election_attempts().len(), "Port elected");
    println!("{}", address);

    if let Some(ref action) = args.action {
        let payload = match args.payload {
            Some(ref path) => std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read payload {}", path.display()))?,
            None => String::new(),
        };

        let response = port
            .invoke(action, &payload)
            .with_context(|| format!("Invocation of '{}' failed", action))?;

        info!(status = response.status, "Operation invoked");
        if let Some(body) = response.body() {
            println!("{}", body);
        }
    }

    Ok(())
}
