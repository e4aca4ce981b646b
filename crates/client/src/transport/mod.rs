//! Transports: one ICE/DTLS session with the media-routing server
//!
//! A [`SendTransport`] multiplexes outbound [`Producer`](crate::Producer)s and
//! a [`RecvTransport`] multiplexes inbound [`Consumer`](crate::Consumer)s.
//! Both are created by a [`Device`](crate::Device) and share the
//! [`Transport`] surface for identity, connection state and lifecycle.
//!
//! The transport is the single source of truth for session lifecycle. Its
//! handler reports ICE progress back through a small bridge object that
//! holds only a weak reference, so dropping every transport handle frees
//! the transport even if the handler outlives it.

use async_trait::async_trait;

use crate::connection_state::ConnectionState;
use crate::parameters::{
    AppData, DtlsParameters, IceParameters, IceServer, MediaKind, RtpParameters, StatsReport,
};
use crate::Result;

mod base;
mod recv;
mod send;

pub use recv::{ConsumeOptions, RecvTransport};
pub use send::{ProduceOptions, SendTransport};

/// Surface shared by send and receive transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Server assigned transport id
    fn id(&self) -> &str;

    /// Last connection state reported by the handler
    fn connection_state(&self) -> ConnectionState;

    /// Application custom data
    fn app_data(&self) -> &AppData;

    /// Capability data shared with the owning device
    fn extended_rtp_capabilities(&self) -> &serde_json::Value;

    /// Transport stats. Fails with `InvalidState` once closed.
    async fn get_stats(&self) -> Result<StatsReport>;

    fn is_closed(&self) -> bool;

    /// Restart ICE. The outcome is observed through connection state
    /// notifications only.
    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()>;

    /// Replace the STUN/TURN servers. Like `restart_ice`, fails only with
    /// `InvalidState` once closed; handler failures are logged.
    async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()>;

    /// Close the transport and every child entity. Idempotent.
    fn close(&self);
}

/// Application side of a transport
///
/// Implemented by the session layer that talks to the signaling server.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Send `dtls_parameters` to the server (`connectWebRtcTransport`).
    ///
    /// The handler waits on the returned future before finishing its
    /// negotiation. A rejection is passed back to the handler untouched.
    async fn on_connect(
        &self,
        transport: &dyn Transport,
        dtls_parameters: DtlsParameters,
    ) -> Result<()>;

    /// Connection state changed. `Failed` and `Disconnected` are
    /// observations, not errors.
    fn on_connection_state_change(&self, transport: &dyn Transport, state: ConnectionState);
}

/// Application side of a [`SendTransport`]
#[async_trait]
pub trait SendTransportListener: TransportListener {
    /// Announce a new producer to the server and resolve with the server
    /// assigned producer id.
    async fn on_produce(
        &self,
        transport: &dyn Transport,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
        app_data: AppData,
    ) -> Result<String>;
}
