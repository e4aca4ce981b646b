//! Session factory owning negotiated capability data
//!
//! The device is the only way to build transports. It holds the capability
//! data for the whole client session and shares it read-only with every
//! transport it creates.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{PeerConnectionOptions, TransportOptions};
use crate::handler::{HandlerFactory, HandlerOptions};
use crate::parameters::MediaKind;
use crate::transport::{RecvTransport, SendTransport, SendTransportListener, TransportListener};
use crate::Result;

/// Capability data computed from the router's RTP capabilities
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    /// Codecs and header extensions supported by both ends
    #[serde(default)]
    pub extended_rtp_capabilities: serde_json::Value,

    /// Media kinds this device may send
    #[serde(default)]
    pub can_produce_by_kind: HashMap<MediaKind, bool>,
}

impl DeviceCapabilities {
    pub fn new(extended_rtp_capabilities: serde_json::Value) -> Self {
        Self {
            extended_rtp_capabilities,
            can_produce_by_kind: HashMap::new(),
        }
    }

    /// Allow or forbid producing `kind`
    pub fn with_can_produce(mut self, kind: MediaKind, can_produce: bool) -> Self {
        self.can_produce_by_kind.insert(kind, can_produce);
        self
    }
}

/// Client session factory
pub struct Device {
    extended_rtp_capabilities: Arc<serde_json::Value>,
    can_produce_by_kind: HashMap<MediaKind, bool>,
    handler_factory: Arc<dyn HandlerFactory>,
}

impl Device {
    pub fn new(capabilities: DeviceCapabilities, handler_factory: Arc<dyn HandlerFactory>) -> Self {
        Self {
            extended_rtp_capabilities: Arc::new(capabilities.extended_rtp_capabilities),
            can_produce_by_kind: capabilities.can_produce_by_kind,
            handler_factory,
        }
    }

    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.can_produce_by_kind.get(&kind).copied().unwrap_or(false)
    }

    pub fn extended_rtp_capabilities(&self) -> &serde_json::Value {
        &self.extended_rtp_capabilities
    }

    fn handler_options(
        &self,
        options: &TransportOptions,
        peer_connection_options: PeerConnectionOptions,
    ) -> HandlerOptions {
        HandlerOptions {
            transport_id: options.id.clone(),
            ice_parameters: options.ice_parameters.clone(),
            ice_candidates: options.ice_candidates.clone(),
            dtls_parameters: options.dtls_parameters.clone(),
            sctp_parameters: options.sctp_parameters.clone(),
            peer_connection_options,
            extended_rtp_capabilities: Arc::clone(&self.extended_rtp_capabilities),
        }
    }

    /// Create a transport for sending media
    pub fn create_send_transport(
        &self,
        listener: Arc<dyn SendTransportListener>,
        options: TransportOptions,
        peer_connection_options: PeerConnectionOptions,
    ) -> Result<SendTransport> {
        options.validate()?;
        debug!("Creating send transport {}", options.id);

        let handler_options = self.handler_options(&options, peer_connection_options);
        let factory = Arc::clone(&self.handler_factory);

        SendTransport::new(
            options.id,
            options.app_data,
            Arc::clone(&self.extended_rtp_capabilities),
            self.can_produce_by_kind.clone(),
            listener,
            move |handler_listener| factory.create_send_handler(handler_options, handler_listener),
        )
    }

    /// Create a transport for receiving media
    pub fn create_recv_transport(
        &self,
        listener: Arc<dyn TransportListener>,
        options: TransportOptions,
        peer_connection_options: PeerConnectionOptions,
    ) -> Result<RecvTransport> {
        options.validate()?;
        debug!("Creating recv transport {}", options.id);

        let handler_options = self.handler_options(&options, peer_connection_options);
        let factory = Arc::clone(&self.handler_factory);

        RecvTransport::new(
            options.id,
            options.app_data,
            Arc::clone(&self.extended_rtp_capabilities),
            listener,
            move |handler_listener| factory.create_recv_handler(handler_options, handler_listener),
        )
    }
}
