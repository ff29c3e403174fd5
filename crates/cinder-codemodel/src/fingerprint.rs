use std::fmt;

use cinder_pp::Macro;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A stable SHA-256 content identity stored as a lowercase hex string.
///
/// Two documents with equal fingerprints are treated as semantically
/// interchangeable for reuse, even if their raw source bytes differ.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The fingerprint of a not-yet-processed document.
    pub fn empty() -> Self {
        Self(String::new())
    }

    /// Compute the fingerprint of a processed file: the macro-expanded text,
    /// then every macro defined while processing it, in definition order.
    ///
    /// An `#undef` contributes a fixed undef tag plus the name; a definition
    /// contributes the name, a def tag and the full definition text. Each
    /// macro's contribution is newline-terminated, so adjacent entries cannot
    /// alias each other.
    pub fn of_document(defined_macros: &[Macro], code: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        for mac in defined_macros {
            if mac.is_hidden() {
                hasher.update(b"#undef ");
                hasher.update(mac.name().as_bytes());
            } else {
                hasher.update(mac.name().as_bytes());
                hasher.update(b" ");
                hasher.update(b"#define ");
                hasher.update(mac.definition_text().as_bytes());
            }
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes.as_ref());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
