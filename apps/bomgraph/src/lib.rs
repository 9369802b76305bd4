//! # bomgraph
//!
//! Server and CLI around `bomgraph-core`. The library target exists so the
//! integration tests can build the router without starting a listener.

pub mod api;
pub mod cli;
pub mod config;
