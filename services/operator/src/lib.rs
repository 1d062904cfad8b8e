//! kperf Benchmark Operator Library
//!
//! The operator watches `Benchmark` resources and materializes each one into
//! the Kubernetes objects that run it: a single Job for one-shot tools, or a
//! server Deployment behind a headless Service plus a client Job for
//! network tools.
//!
//! ## Pipeline
//!
//! ```text
//! Benchmark ─ validation ─ plan::normalize ─ builder::build ─ ClusterClient
//!                                  │
//!                              topology (client/server kinds)
//! ```
//!
//! Every stage up to the builder is a pure function of the benchmark and the
//! instant of the pass. Only the controller talks to the cluster, and only to
//! create children, read its Job and write status.
//!
//! ## Modules
//!
//! - `kinds`: per-tool validation and command lines
//! - `plan`: execution plans derived from a benchmark
//! - `builder`: Kubernetes objects built from a plan
//! - `cluster`: cluster client seam, live and in-memory
//! - `controller`: reconciliation passes and the watch loop

pub mod builder;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod controller;
pub mod error;
pub mod kinds;
pub mod labels;
pub mod plan;
pub mod topology;
pub mod validation;
