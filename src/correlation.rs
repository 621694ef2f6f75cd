use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Correlation identifier pairing a published request with its reply.
///
/// Backed by a random UUID v4 (122 random bits), rendered in the standard
/// 36-byte hyphenated form. The identifier travels in-band in the envelope and
/// is opaque to transports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(Arc<str>);

impl CorrelationId {
    // ---

    /// Generate a new random correlation ID.
    pub fn generate() -> Self {
        // ---
        Self(Arc::from(Uuid::new_v4().to_string()))
    }

    pub fn as_str(&self) -> &str {
        // ---
        &self.0
    }

    /// Shared string form, as carried by [`Envelope`](crate::Envelope).
    pub fn as_arc(&self) -> Arc<str> {
        // ---
        self.0.clone()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        f.write_str(&self.0)
    }
}

impl From<Arc<str>> for CorrelationId {
    fn from(value: Arc<str>) -> Self {
        // ---
        Self(value)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        // ---
        Self(Arc::from(value))
    }
}

impl From<String> for CorrelationId {
    fn from(value: String) -> Self {
        // ---
        Self(Arc::from(value))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_generate_unique() {
        // ---
        let ids: HashSet<CorrelationId> = (0..10_000).map(|_| CorrelationId::generate()).collect();
        assert_eq!(ids.len(), 10_000);
    }

    #[test]
    fn test_format() {
        // ---
        let id = CorrelationId::generate();
        assert_eq!(id.to_string().len(), 36); // Standard UUID format
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_round_trips_through_arc() {
        // ---
        let id = CorrelationId::generate();
        let back = CorrelationId::from(id.as_arc());
        assert_eq!(id, back);
    }
}
