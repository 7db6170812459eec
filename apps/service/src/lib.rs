//! Domain reachability monitor: probes registered hostnames over HTTP(S),
//! keeps a result history and alerts owners on up/down transitions.

pub mod config;
pub mod database;
pub mod monitoring;
pub mod notify;
pub mod orchestrator;
pub mod pool;
