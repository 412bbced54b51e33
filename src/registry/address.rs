//! Peer addresses
//!
//! A peer address names a registry key and the transport endpoint bound for
//! it. The same key in two namespaces maps to two distinct endpoints.

/// Location of one registered peer: namespace, bucket path and key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerAddr {
    /// Registry namespace (e.g., "bus")
    pub namespace: String,
    /// Bucket path under the namespace (e.g., `["lobby"]`)
    pub path: Vec<String>,
    /// Peer key inside the bucket (e.g., "alice" or "7")
    pub key: String,
}

impl PeerAddr {
    /// Create a new peer address
    pub fn new<S: AsRef<str>>(namespace: impl Into<String>, path: &[S], key: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.iter().map(|s| s.as_ref().to_string()).collect(),
            key: key.into(),
        }
    }

    /// Address of a sibling key in the same bucket
    pub fn sibling(&self, key: impl Into<String>) -> Self {
        Self {
            namespace: self.namespace.clone(),
            path: self.path.clone(),
            key: key.into(),
        }
    }

    /// Transport endpoint string
    pub fn endpoint(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}://", self.namespace)?;
        for segment in &self.path {
            write!(f, "{}/", segment)?;
        }
        f.write_str(&self.key)
    }
}
