//! mediaroute client - transport session layer
//!
//! Connects an application to a media-routing server over ICE/DTLS. A
//! [`Device`] creates transports; a [`SendTransport`] carries outbound
//! [`Producer`]s and a [`RecvTransport`] carries inbound [`Consumer`]s.
//!
//! # Architecture
//!
//! - The negotiation [`Handler`](handler::Handler) (peer connection backend)
//!   is supplied by the platform through a [`HandlerFactory`]
//! - Signaling is supplied by the application through
//!   [`TransportListener`] / [`SendTransportListener`]
//! - The transport owns the session lifecycle: connection state, the closed
//!   latch and closure of every producer/consumer
//!
//! # Example
//!
//! ```ignore
//! use mediaroute_client::{Device, DeviceCapabilities, MediaKind, TransportOptions};
//!
//! let device = Device::new(
//!     DeviceCapabilities::new(extended_caps).with_can_produce(MediaKind::Audio, true),
//!     handler_factory,
//! );
//! let transport = device.create_send_transport(
//!     signaling,
//!     TransportOptions::from_json(&server_response)?,
//!     Default::default(),
//! )?;
//! let producer = transport
//!     .produce(events, microphone_track, serde_json::json!({}))
//!     .await?;
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod connection_state;
pub mod consumer;
pub mod device;
pub mod handler;
pub mod parameters;
pub mod producer;
pub mod track;
pub mod transport;

mod error;

pub use config::{IceTransportPolicy, PeerConnectionOptions, TransportOptions};
pub use connection_state::{ConnectionState, IceConnectionState};
pub use consumer::{Consumer, ConsumerPublicListener, WeakConsumer};
pub use device::{Device, DeviceCapabilities};
pub use error::{Error, Result};
pub use handler::{HandlerFactory, HandlerListener, HandlerOptions, RecvHandler, SendHandler};
pub use parameters::{
    AppData, DtlsFingerprint, DtlsParameters, DtlsRole, IceCandidate, IceParameters, IceServer,
    MediaKind, RtpEncodingParameters, RtpParameters, StatsReport,
};
pub use producer::{Producer, ProducerPublicListener, WeakProducer};
pub use track::MediaTrack;
pub use transport::{
    ConsumeOptions, ProduceOptions, RecvTransport, SendTransport, SendTransportListener,
    Transport, TransportListener,
};

/// Install a `tracing` subscriber for applications without their own.
///
/// Filter directives come from `RUST_LOG`, defaulting to `info`. Calling it
/// again, or after another subscriber was installed, is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    tracing::debug!("mediaroute client tracing initialized");
}
