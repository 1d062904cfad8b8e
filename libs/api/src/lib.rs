//! # kperf-api
//!
//! Custom resource types for the kperf benchmark operator.
//!
//! ## Design Principles
//!
//! - One `Benchmark` resource covers every supported benchmark tool; the
//!   tool is selected by exactly one block under `spec.workload`
//! - Types are plain data: no cluster access, no derived state
//! - Nested options are copied with `Clone`; nothing here is mutated by the
//!   operator
//!
//! ## Benchmark Shapes
//!
//! - Job-only kinds (`drill`, `fio`, `ioping`, `sysbench`, `pgbench`,
//!   `ocpLogtest`, `ycsb`) run as a single one-shot Job
//! - Client/server kinds (`iperf2`, `iperf3`, `qperf`, `ethr`) run a server
//!   Deployment behind a headless Service plus a client Job

mod benchmark;
mod kinds;
mod pod;
mod status;

pub use benchmark::*;
pub use kinds::*;
pub use pod::*;
pub use status::*;

/// API group of the `Benchmark` resource.
pub const API_GROUP: &str = "perf.kperf.dev";

/// Served version of the `Benchmark` resource.
pub const API_VERSION: &str = "v1alpha1";
