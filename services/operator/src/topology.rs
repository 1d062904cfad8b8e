//! Topology of client/server benchmarks.
//!
//! The server side of a network benchmark is a Deployment reachable through
//! a headless Service. Both are named after the benchmark, so the client can
//! address the server without any lookup. One [`Transport`] is chosen per
//! benchmark and every derived port and protocol flag uses it.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::plan::PortPlan;

/// Transport protocol of a client/server benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Transport {
    Tcp,
    Udp,
}

impl Transport {
    /// TCP unless the benchmark opted into UDP.
    pub fn from_udp(udp: bool) -> Self {
        if udp {
            Transport::Udp
        } else {
            Transport::Tcp
        }
    }

    /// Protocol name as used by Kubernetes ports.
    pub fn protocol(&self) -> &'static str {
        match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        }
    }

    /// Kernel socket tables listing bound sockets of this transport, IPv4 first.
    pub fn socket_tables(&self) -> [&'static str; 2] {
        match self {
            Transport::Tcp => ["/proc/1/net/tcp", "/proc/1/net/tcp6"],
            Transport::Udp => ["/proc/1/net/udp", "/proc/1/net/udp6"],
        }
    }
}

impl std::fmt::Display for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.protocol())
    }
}

/// Stable in-cluster name of a benchmark's server.
///
/// The headless Service and the Deployment share it; DNS resolution of the
/// name returns the server pod itself.
pub fn server_name(benchmark_name: &str) -> String {
    benchmark_name.to_string()
}

/// Resolved server endpoint of a client/server benchmark.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerTopology {
    /// Name of the headless Service and the server Deployment.
    pub service_name: String,

    /// Transport threaded through every port and flag.
    pub transport: Transport,

    /// Ports exposed by the server, all on `transport`.
    pub ports: Vec<PortPlan>,

    /// Labels selecting the server pod.
    pub selector: BTreeMap<String, String>,
}

impl ServerTopology {
    /// Address the client uses to reach the server.
    pub fn address(&self) -> &str {
        &self.service_name
    }
}

/// Resolve the server endpoint for a benchmark.
pub fn resolve(
    benchmark_name: &str,
    transport: Transport,
    ports: &[(&str, i32)],
    selector: BTreeMap<String, String>,
) -> ServerTopology {
    ServerTopology {
        service_name: server_name(benchmark_name),
        transport,
        ports: ports
            .iter()
            .map(|(name, port)| PortPlan {
                name: name.to_string(),
                port: *port,
                transport,
            })
            .collect(),
        selector,
    }
}
