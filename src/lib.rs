#![forbid(unsafe_code)]

//! Transport bridge and execution orchestrator for Unity editor instances
//! speaking the UnityMCP length-prefixed framing protocol.

pub mod config;
pub mod errors;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod registry;
pub mod transport;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
