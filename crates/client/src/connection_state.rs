//! Transport connection state
//!
//! Handlers report the native ICE connection state; transports store and
//! publish the mapped [`ConnectionState`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// ICE connection state as reported by the negotiation handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
    /// Sentinel some ICE stacks emit before gathering starts
    Unspecified,
}

/// Connection state of a transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

impl ConnectionState {
    /// Textual projection sent to listeners and signaling peers
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::New => "new",
            ConnectionState::Checking => "checking",
            ConnectionState::Connected => "connected",
            ConnectionState::Completed => "completed",
            ConnectionState::Failed => "failed",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether media can flow in this state
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Completed)
    }
}

impl From<IceConnectionState> for ConnectionState {
    fn from(state: IceConnectionState) -> Self {
        match state {
            IceConnectionState::New | IceConnectionState::Unspecified => ConnectionState::New,
            IceConnectionState::Checking => ConnectionState::Checking,
            IceConnectionState::Connected => ConnectionState::Connected,
            IceConnectionState::Completed => ConnectionState::Completed,
            IceConnectionState::Failed => ConnectionState::Failed,
            IceConnectionState::Disconnected => ConnectionState::Disconnected,
            IceConnectionState::Closed => ConnectionState::Closed,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
