//! Unity instance identity and deterministic project identifiers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Number of hex characters kept from the digest when deriving a project ID.
const PROJECT_ID_LEN: usize = 16;

/// Identity of one reachable Unity editor process.
///
/// Instances are ephemeral: they are rebuilt on every discovery sweep and
/// never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Instance {
    /// Short human-shareable identifier, `<name>@<hash prefix>`.
    pub id: String,
    /// Project name reported by the editor.
    pub name: String,
    /// Project filesystem path reported by the editor.
    pub path: String,
    /// Channel hash taken from the endpoint filename.
    pub hash: String,
}

impl Instance {
    /// Build an instance identity from discovery output.
    #[must_use]
    pub fn new(name: String, path: String, hash: String) -> Self {
        let prefix_len = hash.len().min(8);
        let id = format!("{name}@{}", &hash[..prefix_len]);
        Self {
            id,
            name,
            path,
            hash,
        }
    }

    /// The stable project identifier for this instance.
    #[must_use]
    pub fn project_id(&self) -> String {
        compute_project_id(&self.name, &self.path)
    }
}

/// Derive the stable 16-character project identifier for a Unity project.
///
/// SHA-256 of `<name>:<path>`, hex-encoded, uppercased, truncated. The same
/// `(name, path)` pair always yields the same identifier.
#[must_use]
pub fn compute_project_id(name: &str, path: &str) -> String {
    let digest = Sha256::digest(format!("{name}:{path}").as_bytes());
    let mut id = String::with_capacity(PROJECT_ID_LEN);
    for byte in digest.iter() {
        id.push_str(&format!("{byte:02X}"));
        if id.len() >= PROJECT_ID_LEN {
            break;
        }
    }
    id.truncate(PROJECT_ID_LEN);
    id
}
