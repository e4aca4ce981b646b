//! Receiving transport and its consumer registry

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::base::TransportBase;
use super::{Transport, TransportListener};
use crate::connection_state::{ConnectionState, IceConnectionState};
use crate::consumer::{Consumer, ConsumerListener, ConsumerPublicListener, WeakConsumer};
use crate::handler::{HandlerListener, RecvHandler, RecvResult};
use crate::parameters::{
    AppData, DtlsParameters, IceParameters, IceServer, MediaKind, RtpParameters, StatsReport,
};
use crate::{Error, Result};

/// Consumer description, as received in the server's `newConsumer` message
#[derive(Debug, Clone)]
pub struct ConsumeOptions {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: RtpParameters,
    pub app_data: AppData,
}

impl ConsumeOptions {
    pub fn new(
        id: impl Into<String>,
        producer_id: impl Into<String>,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Self {
        Self {
            id: id.into(),
            producer_id: producer_id.into(),
            kind,
            rtp_parameters,
            app_data: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_app_data(mut self, app_data: AppData) -> Self {
        self.app_data = app_data;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::InvalidParameter("missing consumer id".to_string()));
        }
        if self.producer_id.is_empty() {
            return Err(Error::InvalidParameter("missing producer id".to_string()));
        }
        if !self.app_data.is_object() {
            return Err(Error::InvalidParameter(
                "appData must be an object".to_string(),
            ));
        }
        Ok(())
    }
}

struct RegisteredConsumer {
    consumer: WeakConsumer,
    /// Kept so the receiver can be stopped after the handle is gone
    local_id: String,
}

#[derive(Default)]
struct ConsumerRegistry {
    registered: HashMap<String, RegisteredConsumer>,
    /// Ids whose handler setup is still running
    pending: HashSet<String>,
}

impl ConsumerRegistry {
    fn live_count(&self) -> usize {
        self.registered
            .values()
            .filter(|entry| entry.consumer.is_alive())
            .count()
    }

    /// Drop entries whose consumer handle was dropped without `close()`,
    /// returning the local ids of their receivers.
    fn prune(&mut self) -> Vec<String> {
        let mut stale = Vec::new();
        self.registered.retain(|_, entry| {
            if entry.consumer.is_alive() {
                true
            } else {
                stale.push(std::mem::take(&mut entry.local_id));
                false
            }
        });
        stale
    }
}

/// Holds a consumer id in `pending` until dropped
struct Reservation<'a> {
    registry: &'a Mutex<ConsumerRegistry>,
    id: String,
}

impl<'a> Reservation<'a> {
    fn acquire(registry: &'a Mutex<ConsumerRegistry>, id: &str) -> Result<Self> {
        let mut guard = registry.lock();
        if guard.registered.contains_key(id) || !guard.pending.insert(id.to_string()) {
            return Err(Error::DuplicateId(id.to_string()));
        }
        Ok(Self {
            registry,
            id: id.to_string(),
        })
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.registry.lock().pending.remove(&self.id);
    }
}

struct RecvTransportInner {
    base: TransportBase<dyn RecvHandler, dyn TransportListener>,
    consumers: Mutex<ConsumerRegistry>,
}

/// Transport carrying remote tracks to the application
///
/// Cloning is cheap; all clones refer to the same transport.
#[derive(Clone)]
pub struct RecvTransport {
    inner: Arc<RecvTransportInner>,
}

impl RecvTransport {
    /// Build the transport, then its handler through `create_handler`.
    pub(crate) fn new<F>(
        id: String,
        app_data: AppData,
        extended_rtp_capabilities: Arc<serde_json::Value>,
        listener: Arc<dyn TransportListener>,
        create_handler: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn HandlerListener>) -> Result<Arc<dyn RecvHandler>>,
    {
        let inner = Arc::new(RecvTransportInner {
            base: TransportBase::new(id, app_data, extended_rtp_capabilities, listener),
            consumers: Mutex::new(ConsumerRegistry::default()),
        });

        let bridge: Arc<dyn HandlerListener> = Arc::new(RecvHandlerBridge {
            transport: Arc::downgrade(&inner),
        });
        let handler = create_handler(bridge)?;
        inner.base.set_handler(handler);

        info!("Created recv transport {}", inner.base.id());
        Ok(Self { inner })
    }

    /// Number of live consumers
    pub fn consumer_count(&self) -> usize {
        self.inner.consumers.lock().live_count()
    }

    /// Registered consumer by id
    pub fn consumer(&self, id: &str) -> Option<Consumer> {
        let consumers = self.inner.consumers.lock();
        consumers
            .registered
            .get(id)
            .and_then(|entry| entry.consumer.upgrade())
    }

    /// Start receiving a remote producer.
    ///
    /// The id comes from the server, so no signaling round trip is needed;
    /// only the handler is asked to set up the receiver.
    pub async fn consume(
        &self,
        public_listener: Arc<dyn ConsumerPublicListener>,
        options: ConsumeOptions,
    ) -> Result<Consumer> {
        let base = &self.inner.base;

        if base.is_closed() {
            return Err(base.closed_error());
        }
        options.validate()?;

        let ConsumeOptions {
            id,
            producer_id,
            kind,
            rtp_parameters,
            app_data,
        } = options;

        let handler = base.handler()?;
        let stale = self.inner.consumers.lock().prune();
        for local_id in stale {
            self.stop_receiver(handler.as_ref(), &local_id).await;
        }

        let reservation = Reservation::acquire(&self.inner.consumers, &id)?;

        let RecvResult { local_id, track } = handler.receive(&id, kind, &rtp_parameters).await?;
        if track.kind() != kind {
            self.stop_receiver(handler.as_ref(), &local_id).await;
            return Err(Error::Handler(format!(
                "handler returned a {} track for {} consumer {}",
                track.kind(),
                kind,
                id
            )));
        }

        let consumer = Consumer::new(
            id.clone(),
            local_id,
            producer_id,
            kind,
            track,
            rtp_parameters,
            app_data,
            Arc::new(ConsumerBridge {
                transport: Arc::downgrade(&self.inner),
            }),
            public_listener,
        );

        // Same ordering as the send side: close() latches `closed` before
        // draining, so a consumer is either drained or rejected here.
        let registered = {
            let mut consumers = self.inner.consumers.lock();
            if base.is_closed() {
                false
            } else {
                consumers.registered.insert(
                    id.clone(),
                    RegisteredConsumer {
                        consumer: consumer.downgrade(),
                        local_id: consumer.local_id().to_string(),
                    },
                );
                true
            }
        };
        drop(reservation);

        if !registered {
            return Err(base.closed_error());
        }

        debug!(
            "Registered {} consumer {} on transport {}",
            kind,
            id,
            base.id()
        );
        Ok(consumer)
    }

    /// Skipped once closed: the handler released every receiver already.
    async fn stop_receiver(&self, handler: &dyn RecvHandler, local_id: &str) {
        if self.inner.base.is_closed() {
            return;
        }
        if let Err(error) = handler.stop_receiving(local_id).await {
            warn!(
                "Failed to stop receiver {} on transport {}: {}",
                local_id,
                self.inner.base.id(),
                error
            );
        }
    }
}

#[async_trait]
impl Transport for RecvTransport {
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

        let consumers = std::mem::take(&mut self.inner.consumers.lock().registered);
        debug!(
            "Notifying {} consumer(s) of transport {} closure",
            consumers.len(),
            self.inner.base.id()
        );
        for consumer in consumers.values().filter_map(|entry| entry.consumer.upgrade()) {
            consumer.transport_closed();
        }
    }
}

fn upgrade(transport: &Weak<RecvTransportInner>) -> Result<RecvTransport> {
    transport
        .upgrade()
        .map(|inner| RecvTransport { inner })
        .ok_or_else(|| Error::InvalidState("recv transport dropped".to_string()))
}

struct RecvHandlerBridge {
    transport: Weak<RecvTransportInner>,
}

#[async_trait]
impl HandlerListener for RecvHandlerBridge {
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

struct ConsumerBridge {
    transport: Weak<RecvTransportInner>,
}

#[async_trait]
impl ConsumerListener for ConsumerBridge {
    async fn on_close(&self, consumer: &Consumer) {
        let Ok(transport) = upgrade(&self.transport) else {
            return;
        };

        transport
            .inner
            .consumers
            .lock()
            .registered
            .remove(consumer.id());

        let Ok(handler) = transport.inner.base.handler() else {
            return;
        };
        if let Err(error) = handler.stop_receiving(consumer.local_id()).await {
            warn!(
                "Failed to stop receiver {} of consumer {}: {}",
                consumer.local_id(),
                consumer.id(),
                error
            );
        }
    }

    async fn on_get_stats(&self, consumer: &Consumer) -> Result<StatsReport> {
        let transport = upgrade(&self.transport)?;
        let registered = transport
            .inner
            .consumers
            .lock()
            .registered
            .contains_key(consumer.id());
        if !registered {
            return Err(Error::InvalidState(format!(
                "consumer {} not registered on transport {}",
                consumer.id(),
                transport.inner.base.id()
            )));
        }
        let handler = transport.inner.base.handler()?;
        handler.receiver_stats(consumer.local_id()).await
    }
}
