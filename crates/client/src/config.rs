//! Configuration types for creating transports
//!
//! [`TransportOptions`] carries what the server returned when it created its
//! side of the transport. [`PeerConnectionOptions`] carries local settings
//! for the handler.
//!
//! # Example
//!
//! ```
//! use mediaroute_client::config::{PeerConnectionOptions, IceTransportPolicy};
//! use mediaroute_client::IceServer;
//!
//! let options = PeerConnectionOptions::default()
//!     .with_ice_server(IceServer::new("stun:stun.example.org:3478"))
//!     .with_ice_transport_policy(IceTransportPolicy::Relay);
//! assert_eq!(options.ice_servers.len(), 1);
//! ```

use serde::{Deserialize, Serialize};

use crate::parameters::{AppData, DtlsParameters, IceCandidate, IceParameters, IceServer};
use crate::{Error, Result};

/// Server-side transport description, as sent by the signaling server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    /// Server assigned transport id
    pub id: String,

    pub ice_parameters: IceParameters,

    pub ice_candidates: Vec<IceCandidate>,

    pub dtls_parameters: DtlsParameters,

    /// SCTP parameters when data channels are enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<serde_json::Value>,

    /// Application custom data
    #[serde(default = "empty_app_data")]
    pub app_data: AppData,
}

fn empty_app_data() -> AppData {
    serde_json::Value::Object(Default::default())
}

impl TransportOptions {
    /// Create options from the mandatory server parameters
    pub fn new(
        id: impl Into<String>,
        ice_parameters: IceParameters,
        ice_candidates: Vec<IceCandidate>,
        dtls_parameters: DtlsParameters,
    ) -> Self {
        Self {
            id: id.into(),
            ice_parameters,
            ice_candidates,
            dtls_parameters,
            sctp_parameters: None,
            app_data: empty_app_data(),
        }
    }

    /// Parse the server's `createWebRtcTransport` response
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Reject options the transport cannot be built from
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidParameter("missing transport id".to_string()));
        }
        if !self.app_data.is_object() {
            return Err(Error::InvalidParameter(
                "appData must be an object".to_string(),
            ));
        }
        Ok(())
    }

    /// Set SCTP parameters
    pub fn with_sctp_parameters(mut self, sctp_parameters: serde_json::Value) -> Self {
        self.sctp_parameters = Some(sctp_parameters);
        self
    }

    /// Set application data
    pub fn with_app_data(mut self, app_data: AppData) -> Self {
        self.app_data = app_data;
        self
    }
}

/// Which ICE candidates the handler may use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceTransportPolicy {
    /// Any candidate type
    #[default]
    All,
    /// TURN relay candidates only
    Relay,
}

/// Local handler settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerConnectionOptions {
    /// STUN/TURN servers
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,

    #[serde(default)]
    pub ice_transport_policy: IceTransportPolicy,

    /// Backend specific settings passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl PeerConnectionOptions {
    /// Add a STUN/TURN server
    pub fn with_ice_server(mut self, server: IceServer) -> Self {
        self.ice_servers.push(server);
        self
    }

    /// Set the ICE transport policy
    pub fn with_ice_transport_policy(mut self, policy: IceTransportPolicy) -> Self {
        self.ice_transport_policy = policy;
        self
    }

    /// Set backend specific settings
    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }
}
