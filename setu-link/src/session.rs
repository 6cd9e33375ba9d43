//! Session lifecycle
//!
//! One session per link: `Disconnected -> Handshaking -> Connected ->
//! Disconnected`. The owning node keeps at most one live [`Session`] and
//! drops it on disconnect; side effects of teardown (forced stop on the
//! actuator) are the owner's responsibility.

use crate::error::{LinkError, Result};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Handshaking,
    Connected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Handshaking => "handshaking",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Per-link session state
#[derive(Debug, Clone)]
pub struct Session {
    id: u64,
    peer: SocketAddr,
    node_name: Option<String>,
    state: SessionState,
    opened_at: Instant,
    last_activity: Instant,
}

impl Session {
    /// New session for an accepted connection, awaiting its Hello
    pub fn accept(id: u64, peer: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            peer,
            node_name: None,
            state: SessionState::Handshaking,
            opened_at: now,
            last_activity: now,
        }
    }

    /// Mark the handshake complete and record the peer's declared name
    pub fn complete_handshake(&mut self, node_name: &str) -> Result<()> {
        if self.state != SessionState::Handshaking {
            return Err(LinkError::Handshake(format!(
                "handshake completion in state {}",
                self.state
            )));
        }
        self.node_name = Some(node_name.to_string());
        self.state = SessionState::Connected;
        self.touch();
        Ok(())
    }

    /// Tear the session down
    pub fn close(&mut self) {
        self.state = SessionState::Disconnected;
    }

    /// Record activity on the link
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last frame in either direction
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Session age
    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Peer name from the Hello, if the handshake completed
    pub fn node_name(&self) -> Option<&str> {
        self.node_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:9000".parse().unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut session = Session::accept(1, test_addr());
        assert_eq!(session.state(), SessionState::Handshaking);
        assert!(!session.is_connected());

        session.complete_handshake("drishti-map").unwrap();
        assert!(session.is_connected());
        assert_eq!(session.node_name(), Some("drishti-map"));

        session.close();
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_double_handshake_rejected() {
        let mut session = Session::accept(2, test_addr());
        session.complete_handshake("drishti-map").unwrap();
        assert!(session.complete_handshake("drishti-map").is_err());
    }

    #[test]
    fn test_touch_resets_idle_time() {
        let mut session = Session::accept(3, test_addr());
        std::thread::sleep(Duration::from_millis(10));
        assert!(session.idle_for() >= Duration::from_millis(10));
        session.touch();
        assert!(session.idle_for() < Duration::from_millis(10));
    }
}
