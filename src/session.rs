use serde::{Deserialize, Serialize};
use std::fmt;

pub const DEFAULT_SESSION_ID: &str = "default-session";

/// Opaque token scoping conversation state on the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Session id plus the request generation.
///
/// Every request is tagged with the generation current at spawn time. A reset
/// bumps the generation, so replies that were in flight across the reset are
/// recognisably stale and get dropped instead of rendered.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    generation: u64,
}

impl SessionContext {
    pub fn new(id: SessionId) -> Self {
        Self { id, generation: 0 }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn advance(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advancing_invalidates_older_generations() {
        let mut session = SessionContext::new(SessionId::default());
        let before = session.generation();
        assert!(session.is_current(before));

        session.advance();
        assert!(!session.is_current(before));
        assert!(session.is_current(before + 1));
    }

    #[test]
    fn session_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&SessionId::new("acme")).unwrap();
        assert_eq!(json, "\"acme\"");
        assert_eq!(SessionId::default().as_str(), "default-session");
    }
}
