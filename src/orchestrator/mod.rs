//! Command-execution orchestration over the transport layer.

pub mod executor;
