//! Sending transport and its producer registry

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::base::TransportBase;
use super::{SendTransportListener, Transport};
use crate::connection_state::{ConnectionState, IceConnectionState};
use crate::handler::{HandlerListener, SendHandler, SendResult};
use crate::parameters::{
    AppData, DtlsParameters, IceParameters, IceServer, MediaKind, RtpEncodingParameters,
    StatsReport,
};
use crate::producer::{Producer, ProducerListener, ProducerPublicListener, WeakProducer};
use crate::track::MediaTrack;
use crate::{Error, Result};

/// Everything `produce` needs besides the public listener
#[derive(Clone)]
pub struct ProduceOptions {
    pub track: Arc<dyn MediaTrack>,
    /// Simulcast/SVC layers; empty lets the handler decide
    pub encodings: Vec<RtpEncodingParameters>,
    /// Codec specific options passed to the handler untouched
    pub codec_options: Option<serde_json::Value>,
    pub app_data: AppData,
}

impl ProduceOptions {
    pub fn new(track: Arc<dyn MediaTrack>) -> Self {
        Self {
            track,
            encodings: Vec::new(),
            codec_options: None,
            app_data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_encodings(mut self, encodings: Vec<RtpEncodingParameters>) -> Self {
        self.encodings = encodings;
        self
    }

    pub fn with_codec_options(mut self, codec_options: serde_json::Value) -> Self {
        self.codec_options = Some(codec_options);
        self
    }

    pub fn with_app_data(mut self, app_data: AppData) -> Self {
        self.app_data = app_data;
        self
    }
}

struct RegisteredProducer {
    producer: WeakProducer,
    /// Kept so the sender can be stopped after the handle is gone
    local_id: String,
}

/// Drop entries whose producer handle was dropped without `close()`,
/// returning the local ids of their senders.
fn prune(producers: &mut HashMap<String, RegisteredProducer>) -> Vec<String> {
    let mut stale = Vec::new();
    producers.retain(|_, entry| {
        if entry.producer.is_alive() {
            true
        } else {
            stale.push(std::mem::take(&mut entry.local_id));
            false
        }
    });
    stale
}

struct SendTransportInner {
    base: TransportBase<dyn SendHandler, dyn SendTransportListener>,
    producers: Mutex<HashMap<String, RegisteredProducer>>,
    can_produce_by_kind: HashMap<MediaKind, bool>,
}

/// Transport carrying the application's outbound tracks
///
/// Cloning is cheap; all clones refer to the same transport.
#[derive(Clone)]
pub struct SendTransport {
    inner: Arc<SendTransportInner>,
}

impl SendTransport {
    /// Build the transport, then its handler through `create_handler`.
    pub(crate) fn new<F>(
        id: String,
        app_data: AppData,
        extended_rtp_capabilities: Arc<serde_json::Value>,
        can_produce_by_kind: HashMap<MediaKind, bool>,
        listener: Arc<dyn SendTransportListener>,
        create_handler: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn HandlerListener>) -> Result<Arc<dyn SendHandler>>,
    {
        let inner = Arc::new(SendTransportInner {
            base: TransportBase::new(id, app_data, extended_rtp_capabilities, listener),
            producers: Mutex::new(HashMap::new()),
            can_produce_by_kind,
        });

        let bridge: Arc<dyn HandlerListener> = Arc::new(SendHandlerBridge {
            transport: Arc::downgrade(&inner),
        });
        let handler = create_handler(bridge)?;
        inner.base.set_handler(handler);

        info!("Created send transport {}", inner.base.id());
        Ok(Self { inner })
    }

    /// Whether the negotiated capabilities allow sending `kind`
    pub fn can_produce(&self, kind: MediaKind) -> bool {
        self.inner
            .can_produce_by_kind
            .get(&kind)
            .copied()
            .unwrap_or(false)
    }

    /// Number of live producers
    pub fn producer_count(&self) -> usize {
        self.inner
            .producers
            .lock()
            .values()
            .filter(|entry| entry.producer.is_alive())
            .count()
    }

    /// Registered producer by server id
    pub fn producer(&self, id: &str) -> Option<Producer> {
        let producers = self.inner.producers.lock();
        producers.get(id).and_then(|entry| entry.producer.upgrade())
    }

    /// Start sending `track`
    pub async fn produce(
        &self,
        public_listener: Arc<dyn ProducerPublicListener>,
        track: Arc<dyn MediaTrack>,
        app_data: AppData,
    ) -> Result<Producer> {
        self.produce_with_options(
            public_listener,
            ProduceOptions::new(track).with_app_data(app_data),
        )
        .await
    }

    /// Start sending `track` with explicit simulcast/SVC layers
    pub async fn produce_with_encodings(
        &self,
        public_listener: Arc<dyn ProducerPublicListener>,
        track: Arc<dyn MediaTrack>,
        encodings: Vec<RtpEncodingParameters>,
        app_data: AppData,
    ) -> Result<Producer> {
        self.produce_with_options(
            public_listener,
            ProduceOptions::new(track)
                .with_encodings(encodings)
                .with_app_data(app_data),
        )
        .await
    }

    /// Start sending a track.
    ///
    /// The handler sets up the sender first (which may trigger the DTLS
    /// connect handshake), then the listener obtains the server assigned
    /// producer id. The producer is registered under that id.
    pub async fn produce_with_options(
        &self,
        public_listener: Arc<dyn ProducerPublicListener>,
        options: ProduceOptions,
    ) -> Result<Producer> {
        let ProduceOptions {
            track,
            encodings,
            codec_options,
            app_data,
        } = options;
        let base = &self.inner.base;

        if base.is_closed() {
            return Err(base.closed_error());
        }
        let kind = track.kind();
        if !self.can_produce(kind) {
            return Err(Error::UnsupportedKind(kind));
        }
        if !app_data.is_object() {
            return Err(Error::InvalidParameter(
                "appData must be an object".to_string(),
            ));
        }

        let handler = base.handler()?;
        let SendResult {
            local_id,
            rtp_parameters,
        } = handler
            .send(Arc::clone(&track), encodings, codec_options)
            .await?;

        let id = match base
            .listener()
            .on_produce(self, kind, rtp_parameters.clone(), app_data.clone())
            .await
        {
            Ok(id) => id,
            Err(error) => {
                self.abort_sending(handler.as_ref(), &local_id).await;
                return Err(error);
            }
        };

        let producer = Producer::new(
            id.clone(),
            local_id.clone(),
            track,
            rtp_parameters,
            app_data,
            Arc::new(ProducerBridge {
                transport: Arc::downgrade(&self.inner),
            }),
            public_listener,
        );

        // Checked under the registry lock: close() latches `closed` before
        // draining the registry, so nothing is inserted after the drain.
        let (rejected, stale) = {
            let mut producers = self.inner.producers.lock();
            let stale = prune(&mut producers);
            let rejected = if base.is_closed() {
                Some(base.closed_error())
            } else if producers.contains_key(&id) {
                Some(Error::DuplicateId(id.clone()))
            } else {
                producers.insert(
                    id.clone(),
                    RegisteredProducer {
                        producer: producer.downgrade(),
                        local_id: local_id.clone(),
                    },
                );
                None
            };
            (rejected, stale)
        };
        for stale_local_id in stale {
            self.abort_sending(handler.as_ref(), &stale_local_id).await;
        }
        if let Some(error) = rejected {
            self.abort_sending(handler.as_ref(), &local_id).await;
            return Err(error);
        }

        debug!(
            "Registered {} producer {} on transport {}",
            kind,
            id,
            base.id()
        );
        Ok(producer)
    }

    /// Stop a sender no producer tracks. Skipped once closed: the handler
    /// released every sender already.
    async fn abort_sending(&self, handler: &dyn SendHandler, local_id: &str) {
        if self.inner.base.is_closed() {
            return;
        }
        if let Err(error) = handler.stop_sending(local_id).await {
            warn!(
                "Failed to stop sender {} on transport {}: {}",
                local_id,
                self.inner.base.id(),
                error
            );
        }
    }
}

#[async_trait]
impl Transport for SendTransport {
    fn id(&self) -> &str {
        self.inner.base.id()
    }

    fn connection_state(&self) -> ConnectionState {
        self.inner.base.connection_state()
    }

    fn app_data(&self) -> &AppData {
        self.inner.base.app_data()
    }

    fn extended_rtp_capabilities(&self) -> &serde_json::Value {
        self.inner.base.extended_rtp_capabilities()
    }

    async fn get_stats(&self) -> Result<StatsReport> {
        self.inner.base.get_stats().await
    }

    fn is_closed(&self) -> bool {
        self.inner.base.is_closed()
    }

    async fn restart_ice(&self, ice_parameters: IceParameters) -> Result<()> {
        self.inner.base.restart_ice(ice_parameters).await
    }

    async fn update_ice_servers(&self, ice_servers: Vec<IceServer>) -> Result<()> {
        self.inner.base.update_ice_servers(ice_servers).await
    }

    fn close(&self) {
        if !self.inner.base.close() {
            return;
        }

        let producers = std::mem::take(&mut *self.inner.producers.lock());
        debug!(
            "Notifying {} producer(s) of transport {} closure",
            producers.len(),
            self.inner.base.id()
        );
        for producer in producers.values().filter_map(|entry| entry.producer.upgrade()) {
            producer.transport_closed();
        }
    }
}

fn upgrade(transport: &Weak<SendTransportInner>) -> Result<SendTransport> {
    transport
        .upgrade()
        .map(|inner| SendTransport { inner })
        .ok_or_else(|| Error::InvalidState("send transport dropped".to_string()))
}

/// Handler notifications, routed to the transport without owning it
struct SendHandlerBridge {
    transport: Weak<SendTransportInner>,
}

#[async_trait]
impl HandlerListener for SendHandlerBridge {
    async fn on_connect(&self, dtls_parameters: DtlsParameters) -> Result<()> {
        let transport = upgrade(&self.transport)?;
        transport
            .inner
            .base
            .on_connect(&transport, dtls_parameters)
            .await
    }

    fn on_connection_state_change(&self, state: IceConnectionState) {
        if let Ok(transport) = upgrade(&self.transport) {
            transport
                .inner
                .base
                .on_connection_state_change(&transport, state);
        }
    }
}

/// Producer callbacks, routed to the transport without owning it
struct ProducerBridge {
    transport: Weak<SendTransportInner>,
}

impl ProducerBridge {
    /// Handler for a producer that must still be registered
    fn registered_handler(
        &self,
        producer: &Producer,
    ) -> Result<(SendTransport, Arc<dyn SendHandler>)> {
        let transport = upgrade(&self.transport)?;
        let registered = transport.inner.producers.lock().contains_key(producer.id());
        if !registered {
            return Err(Error::InvalidState(format!(
                "producer {} not registered on transport {}",
                producer.id(),
                transport.inner.base.id()
            )));
        }
        let handler = transport.inner.base.handler()?;
        Ok((transport, handler))
    }
}

#[async_trait]
impl ProducerListener for ProducerBridge {
    async fn on_close(&self, producer: &Producer) {
        let Ok(transport) = upgrade(&self.transport) else {
            return;
        };

        transport.inner.producers.lock().remove(producer.id());

        let Ok(handler) = transport.inner.base.handler() else {
            return;
        };
        if let Err(error) = handler.stop_sending(producer.local_id()).await {
            warn!(
                "Failed to stop sender {} of producer {}: {}",
                producer.local_id(),
                producer.id(),
                error
            );
        }
    }

    async fn on_replace_track(
        &self,
        producer: &Producer,
        track: Arc<dyn MediaTrack>,
    ) -> Result<()> {
        let (_transport, handler) = self.registered_handler(producer)?;
        handler.replace_track(producer.local_id(), track).await
    }

    async fn on_set_max_spatial_layer(&self, producer: &Producer, spatial_layer: u8) -> Result<()> {
        let (_transport, handler) = self.registered_handler(producer)?;
        handler
            .set_max_spatial_layer(producer.local_id(), spatial_layer)
            .await
    }

    async fn on_get_stats(&self, producer: &Producer) -> Result<StatsReport> {
        let (_transport, handler) = self.registered_handler(producer)?;
        handler.sender_stats(producer.local_id()).await
    }
}
