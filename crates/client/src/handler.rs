//! Negotiation handler interface
//!
//! The handler performs the actual ICE/DTLS negotiation and media plumbing
//! (typically on top of a peer connection). Transports drive it through the
//! traits below and receive its notifications through [`HandlerListener`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PeerConnectionOptions;
use crate::connection_state::IceConnectionState;
use crate::parameters::{
    DtlsParameters, IceCandidate, IceParameters, IceServer, MediaKind, RtpEncodingParameters,
    RtpParameters, StatsReport,
};
use crate::track::MediaTrack;
use crate::Result;

/// Notifications a handler delivers to its owning transport
///
/// May be invoked from the handler's own task or thread, concurrently with
/// application calls on the transport.
#[async_trait]
pub trait HandlerListener: Send + Sync {
    /// The handler needs the transport connected at the signaling layer.
    ///
    /// Resolves once the DTLS parameters were accepted by the server. The
    /// handler must not proceed with negotiation until then.
    async fn on_connect(&self, dtls_parameters: DtlsParameters) -> Result<()>;

    /// The ICE connection state changed
    fn on_connection_state_change(&self, state: IceConnectionState);
}

/// Operations common to send and receive handlers
#[async_trait]
pub trait Handler: Send + Sync {
    /// Release every network resource
    fn close(&self);

    /// Transport level stats
    async fn transport_stats(&self) -> Result<StatsReport>;

    /// Restart ICE with fresh remote parameters
    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()>;

    /// Replace the STUN/TURN servers used for gathering
    async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()>;
}

/// Outcome of [`SendHandler::send`]
#[derive(Debug, Clone)]
pub struct SendResult {
    /// Handler-local sender id (e.g. transceiver mid)
    pub local_id: String,
    /// RTP parameters to announce to the server
    pub rtp_parameters: RtpParameters,
}

/// Handler of a sending transport
#[async_trait]
pub trait SendHandler: Handler {
    /// Start sending `track`
    async fn send(
        &self,
        track: Arc<dyn MediaTrack>,
        encodings: Vec<RtpEncodingParameters>,
        codec_options: Option<serde_json::Value>,
    ) -> Result<SendResult>;

    /// Stop the sender identified by `local_id`
    async fn stop_sending(&self, local_id: &str) -> Result<()>;

    /// Swap the track of a running sender
    async fn replace_track(&self, local_id: &str, track: Arc<dyn MediaTrack>) -> Result<()>;

    /// Cap the highest spatial layer sent
    async fn set_max_spatial_layer(&self, local_id: &str, spatial_layer: u8) -> Result<()>;

    /// Stats of a single sender
    async fn sender_stats(&self, local_id: &str) -> Result<StatsReport>;
}

/// Outcome of [`RecvHandler::receive`]
#[derive(Clone)]
pub struct RecvResult {
    /// Handler-local receiver id
    pub local_id: String,
    /// Remote track delivering the consumed media
    pub track: Arc<dyn MediaTrack>,
}

/// Handler of a receiving transport
#[async_trait]
pub trait RecvHandler: Handler {
    /// Start receiving the remote stream described by `rtp_parameters`
    async fn receive(
        &self,
        id: &str,
        kind: MediaKind,
        rtp_parameters: &RtpParameters,
    ) -> Result<RecvResult>;

    /// Stop the receiver identified by `local_id`
    async fn stop_receiving(&self, local_id: &str) -> Result<()>;

    /// Stats of a single receiver
    async fn receiver_stats(&self, local_id: &str) -> Result<StatsReport>;
}

/// Everything a handler needs to set up its side of the transport
#[derive(Debug, Clone)]
pub struct HandlerOptions {
    pub transport_id: String,
    pub ice_parameters: IceParameters,
    pub ice_candidates: Vec<IceCandidate>,
    pub dtls_parameters: DtlsParameters,
    pub sctp_parameters: Option<serde_json::Value>,
    pub peer_connection_options: PeerConnectionOptions,
    pub extended_rtp_capabilities: Arc<serde_json::Value>,
}

/// Builds handlers for new transports
///
/// Implemented by the platform integration (e.g. a peer connection backend).
pub trait HandlerFactory: Send + Sync {
    fn create_send_handler(
        &self,
        options: HandlerOptions,
        listener: Arc<dyn HandlerListener>,
    ) -> Result<Arc<dyn SendHandler>>;

    fn create_recv_handler(
        &self,
        options: HandlerOptions,
        listener: Arc<dyn HandlerListener>,
    ) -> Result<Arc<dyn RecvHandler>>;
}
