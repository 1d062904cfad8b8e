//! Network benchmarks: iperf2, iperf3, qperf and ethr.

use kperf_api::{ClientServerSpec, EthrSpec, QperfSpec};

use super::ClientServerKind;
use crate::topology::Transport;
use crate::validation::ValidationError;

/// Port of the iperf servers.
pub const IPERF_PORT: i32 = 5201;

/// Control port of the qperf server.
pub const QPERF_PORT: i32 = 19765;

const IPERF_PORTS: &[(&str, i32)] = &[("iperf-server", IPERF_PORT)];

const QPERF_PORTS: &[(&str, i32)] = &[("qperf-server", QPERF_PORT)];

/// Default ports of an ethr server, one per measurement.
const ETHR_PORTS: &[(&str, i32)] = &[
    ("ethr-server-tb", 9999),
    ("ethr-server-tc", 9998),
    ("ethr-server-tl", 9997),
    ("ethr-server-hb", 9899),
    ("ethr-server-hsb", 9799),
    ("ethr-server-hl", 9898),
];

/// Test types accepted by `ethr -t`.
const ETHR_TESTS: &[&str] = &["b", "c", "p", "l", "cl"];

fn strings(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Append `flag` when the benchmark runs over UDP.
fn with_udp_flag(mut args: Vec<String>, transport: Transport, flag: &[&str]) -> Vec<String> {
    if transport == Transport::Udp {
        args.extend(strings(flag));
    }
    args
}

pub struct Iperf2<'a>(pub &'a ClientServerSpec);

impl ClientServerKind for Iperf2<'_> {
    fn endpoints(&self) -> &ClientServerSpec {
        self.0
    }

    fn ports(&self) -> &'static [(&'static str, i32)] {
        IPERF_PORTS
    }

    fn server_command(&self) -> Vec<String> {
        strings(&["iperf2"])
    }

    fn server_args(&self, transport: Transport) -> Vec<String> {
        let args = vec![
            "--server".to_string(),
            "--port".to_string(),
            IPERF_PORT.to_string(),
        ];
        with_udp_flag(args, transport, &["--udp"])
    }

    fn client_command(&self) -> Vec<String> {
        strings(&["iperf2"])
    }

    fn client_args(&self, server: &str, transport: Transport) -> Vec<String> {
        let args = vec![
            "--client".to_string(),
            server.to_string(),
            "--port".to_string(),
            IPERF_PORT.to_string(),
        ];
        with_udp_flag(args, transport, &["--udp"])
    }
}

/// iperf3 selects the transport on the client; the server always listens on TCP.
pub struct Iperf3<'a>(pub &'a ClientServerSpec);

impl ClientServerKind for Iperf3<'_> {
    fn endpoints(&self) -> &ClientServerSpec {
        self.0
    }

    fn ports(&self) -> &'static [(&'static str, i32)] {
        IPERF_PORTS
    }

    fn listen_transport(&self, _transport: Transport) -> Transport {
        Transport::Tcp
    }

    fn server_command(&self) -> Vec<String> {
        strings(&["iperf3"])
    }

    fn server_args(&self, _transport: Transport) -> Vec<String> {
        vec![
            "--server".to_string(),
            "--port".to_string(),
            IPERF_PORT.to_string(),
        ]
    }

    fn client_command(&self) -> Vec<String> {
        strings(&["iperf3"])
    }

    fn client_args(&self, server: &str, transport: Transport) -> Vec<String> {
        let args = vec![
            "--client".to_string(),
            server.to_string(),
            "--port".to_string(),
            IPERF_PORT.to_string(),
        ];
        with_udp_flag(args, transport, &["--udp"])
    }
}

/// qperf talks over a TCP control channel; UDP tests are chosen via `tests`.
pub struct Qperf<'a>(pub &'a QperfSpec);

impl ClientServerKind for Qperf<'_> {
    fn endpoints(&self) -> &ClientServerSpec {
        &self.0.endpoints
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.0.tests.is_empty() {
            return Err(ValidationError::invalid(
                "tests",
                "must name at least one qperf test",
            ));
        }
        if self.0.endpoints.udp {
            return Err(ValidationError::invalid(
                "udp",
                "is not supported by qperf; select UDP tests in tests instead",
            ));
        }
        Ok(())
    }

    fn ports(&self) -> &'static [(&'static str, i32)] {
        QPERF_PORTS
    }

    fn listen_transport(&self, _transport: Transport) -> Transport {
        Transport::Tcp
    }

    fn server_command(&self) -> Vec<String> {
        strings(&["qperf"])
    }

    fn server_args(&self, _transport: Transport) -> Vec<String> {
        vec!["--listen_port".to_string(), QPERF_PORT.to_string()]
    }

    fn client_command(&self) -> Vec<String> {
        strings(&["qperf"])
    }

    fn client_args(&self, server: &str, _transport: Transport) -> Vec<String> {
        let mut args = vec![
            server.to_string(),
            "--listen_port".to_string(),
            QPERF_PORT.to_string(),
        ];
        args.extend(self.0.tests.iter().cloned());
        args
    }
}

pub struct Ethr<'a>(pub &'a EthrSpec);

impl ClientServerKind for Ethr<'_> {
    fn endpoints(&self) -> &ClientServerSpec {
        &self.0.endpoints
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if !ETHR_TESTS.contains(&self.0.test.as_str()) {
            return Err(ValidationError::invalid(
                "test",
                format!(
                    "must be one of {}, got {:?}",
                    ETHR_TESTS.join(", "),
                    self.0.test
                ),
            ));
        }
        Ok(())
    }

    fn ports(&self) -> &'static [(&'static str, i32)] {
        ETHR_PORTS
    }

    fn server_command(&self) -> Vec<String> {
        strings(&["ethr"])
    }

    fn server_args(&self, _transport: Transport) -> Vec<String> {
        strings(&["-s"])
    }

    fn client_command(&self) -> Vec<String> {
        strings(&["ethr"])
    }

    fn client_args(&self, server: &str, transport: Transport) -> Vec<String> {
        let args = vec![
            "-c".to_string(),
            server.to_string(),
            "-t".to_string(),
            self.0.test.clone(),
        ];
        with_udp_flag(args, transport, &["-p", "udp"])
    }
}
