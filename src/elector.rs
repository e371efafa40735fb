//! Failover port election.
//!
//! Candidates are tried strictly in order, one attempt each: build a port for
//! the candidate server, probe it, keep the first one that answers. An empty
//! server list is a single attempt against the bare endpoint (server `""`).

use crate::error::{ClientError, Result};
use tracing::{debug, info, warn};

/// Token replaced by the candidate server name in an endpoint template.
pub const SERVER_PLACEHOLDER: &str = "{{server}}";

/// Replace the first `{{server}}` in `template` with `server`, literally.
pub fn substitute_server(template: &str, server: &str) -> String {
    template.replacen(SERVER_PLACEHOLDER, server, 1)
}

/// Record of one candidate attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub server: String,
    /// Endpoint after substitution
    pub endpoint: String,
    /// Probe error, `None` for the elected candidate
    pub error: Option<String>,
}

/// Outcome of an election.
#[derive(Debug)]
pub struct Election<P> {
    /// Elected port, `None` when every probe failed
    pub port: Option<P>,
    pub attempts: Vec<Attempt>,
}

impl<P> Election<P> {
    pub fn is_elected(&self) -> bool {
        self.port.is_some()
    }

    /// Server of the elected port.
    pub fn elected_server(&self) -> Option<&str> {
        self.port.as_ref()?;
        self.attempts
            .last()
            .filter(|a| a.error.is_none())
            .map(|a| a.server.as_str())
    }
}

/// Drives the probe loop over an endpoint template and its candidate servers.
#[derive(Debug, Clone, Copy)]
pub struct PortElector<'a> {
    endpoint: &'a str,
    servers: &'a [String],
}

impl<'a> PortElector<'a> {
    pub fn new(endpoint: &'a str, servers: &'a [String]) -> Self {
        Self { endpoint, servers }
    }

    /// Candidate servers in probe order.
    pub fn candidates(&self) -> Vec<&'a str> {
        if self.servers.is_empty() {
            vec![""]
        } else {
            self.servers.iter().map(String::as_str).collect()
        }
    }

    /// Run the election.
    ///
    /// `build` creates a fully configured port for `(endpoint template, server)`;
    /// its errors are fatal and abort the election. `check` is the liveness
    /// probe; its errors only move on to the next candidate.
    pub fn elect<P, B, C>(&self, mut build: B, mut check: C) -> Result<Election<P>>
    where
        B: FnMut(&str, &str) -> Result<P>,
        C: FnMut(&P) -> Result<()>,
    {
        let mut attempts = Vec::new();

        for server in self.candidates() {
            let endpoint = substitute_server(self.endpoint, server);
            let port = build(self.endpoint, server)?;

            match check(&port) {
                Ok(()) => {
                    info!(endpoint = %endpoint, server = %server, "Port elected");
                    attempts.push(Attempt {
                        server: server.to_string(),
                        endpoint,
                        error: None,
                    });
                    return Ok(Election {
                        port: Some(port),
                        attempts,
                    });
                }
                Err(e) => {
                    warn!(
                        endpoint = %endpoint,
                        server = %server,
                        error = %e,
                        "Failed to instantiate service"
                    );
                    debug!(endpoint = %endpoint, server = %server, error = ?e, "Probe failure detail");
                    attempts.push(Attempt {
                        server: server.to_string(),
                        endpoint,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        warn!(
            endpoint = %self.endpoint,
            attempts = attempts.len(),
            "No live port found"
        );

        Ok(Election {
            port: None,
            attempts,
        })
    }

    /// Error describing an exhausted election.
    pub fn exhausted(&self) -> ClientError {
        ClientError::NoLivePort {
            endpoint: self.endpoint.to_string(),
            servers: self.servers.to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn servers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_substitute_server() {
        assert_eq!(substitute_server("http://{{server}}/svc", "host1"), "http://host1/svc");
        assert_eq!(substitute_server("http://fixed/svc", "host1"), "http://fixed/svc");
        assert_eq!(
            substitute_server("http://{{server}}/{{server}}", "h"),
            "http://h/{{server}}"
        );
        assert_eq!(substitute_server("http://{{server}}/svc", "a$1\\b"), "http://a$1\\b/svc");
        assert_eq!(substitute_server("http://{{server}}/svc", ""), "http:///svc");
    }

    #[test]
    fn test_elects_first_live_candidate_in_order() {
        let list = servers(&["a", "b", "c"]);
        let elector = PortElector::new("http://{{server}}/svc", &list);
        let probed = RefCell::new(Vec::new());

        let election = elector
            .elect(
                |template, server| Ok(substitute_server(template, server)),
                |port: &String| {
                    probed.borrow_mut().push(port.clone());
                    if port.contains("://c/") {
                        Ok(())
                    } else {
                        Err(ClientError::ProbeFailed("connection refused".to_string()))
                    }
                },
            )
            .unwrap();

        assert_eq!(election.port.as_deref(), Some("http://c/svc"));
        assert_eq!(election.elected_server(), Some("c"));
        assert_eq!(
            *probed.borrow(),
            vec!["http://a/svc", "http://b/svc", "http://c/svc"]
        );
        assert_eq!(election.attempts.len(), 3);
        assert!(election.attempts[0].error.as_deref().unwrap().contains("connection refused"));
    }

    #[test]
    fn test_stops_at_first_success() {
        let list = servers(&["a", "b"]);
        let mut built = 0;
        let election = PortElector::new("http://{{server}}/svc", &list)
            .elect(
                |_, server| {
                    built += 1;
                    Ok(server.to_string())
                },
                |_| Ok(()),
            )
            .unwrap();

        assert_eq!(built, 1);
        assert_eq!(election.port.as_deref(), Some("a"));
    }

    #[test]
    fn test_empty_server_list_single_probed_attempt() {
        let list: Vec<String> = Vec::new();
        let elector = PortElector::new("http://bare/svc", &list);
        assert_eq!(elector.candidates(), vec![""]);

        let mut probes = 0;
        let election = elector
            .elect(
                |template, server| Ok(substitute_server(template, server)),
                |_| {
                    probes += 1;
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(probes, 1);
        assert_eq!(election.port.as_deref(), Some("http://bare/svc"));
        assert_eq!(election.attempts[0].server, "");
    }

    #[test]
    fn test_all_probes_fail_returns_none() {
        let list = servers(&["a", "b"]);
        let elector = PortElector::new("http://{{server}}/svc", &list);
        let election = elector
            .elect(
                |_, server| Ok(server.to_string()),
                |_| Err(ClientError::ProbeFailed("down".to_string())),
            )
            .unwrap();

        assert!(!election.is_elected());
        assert!(election.elected_server().is_none());
        assert_eq!(election.attempts.len(), 2);
        assert!(matches!(elector.exhausted(), ClientError::NoLivePort { .. }));
    }

    #[test]
    fn test_build_failure_is_fatal() {
        let list = servers(&["a", "b"]);
        let mut probes = 0;
        let result = PortElector::new("http://{{server}}/svc", &list).elect(
            |_, _| -> Result<String> { Err(ClientError::service_manager("missing constructor")) },
            |_| {
                probes += 1;
                Ok(())
            },
        );

        assert!(matches!(result, Err(ClientError::ServiceManagerInstantiation(_))));
        assert_eq!(probes, 0);
    }
}
