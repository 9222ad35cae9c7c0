//! Transport layer: framing protocol, local-channel connections, instance
//! discovery, the remote plugin hub client, and the per-call route selector.

pub mod connection;
pub mod discovery;
pub mod framing;
pub mod hub;
pub mod selector;

/// Process-wide transport selection, fixed at startup rather than per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Local-channel path: named pipes / Unix domain sockets to discovered
    /// editor instances.
    Stdio,
    /// Remote-hub path: HTTP to the plugin hub.
    Http,
}

impl TransportMode {
    /// Parse a mode name; anything other than `http` selects the local path.
    #[must_use]
    pub fn from_name(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("http") {
            Self::Http
        } else {
            Self::Stdio
        }
    }
}
