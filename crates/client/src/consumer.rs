//! Inbound media track multiplexed on a receive transport

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tracing::debug;

use crate::parameters::{AppData, MediaKind, RtpParameters, StatsReport};
use crate::track::MediaTrack;
use crate::{Error, Result};

/// Transport side of a consumer
#[async_trait]
pub trait ConsumerListener: Send + Sync {
    /// The consumer was closed by the application
    async fn on_close(&self, consumer: &Consumer);

    async fn on_get_stats(&self, consumer: &Consumer) -> Result<StatsReport>;
}

/// Application side of a consumer
pub trait ConsumerPublicListener: Send + Sync {
    /// The owning transport was closed; the consumer is now closed too
    fn on_transport_close(&self, _consumer: &Consumer) {}
}

struct ConsumerInner {
    id: String,
    local_id: String,
    producer_id: String,
    kind: MediaKind,
    track: Arc<dyn MediaTrack>,
    rtp_parameters: RtpParameters,
    app_data: AppData,
    closed: AtomicBool,
    listener: Arc<dyn ConsumerListener>,
    public_listener: Arc<dyn ConsumerPublicListener>,
}

/// Handle to an inbound track
#[derive(Clone)]
pub struct Consumer {
    inner: Arc<ConsumerInner>,
}

impl Consumer {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: String,
        local_id: String,
        producer_id: String,
        kind: MediaKind,
        track: Arc<dyn MediaTrack>,
        rtp_parameters: RtpParameters,
        app_data: AppData,
        listener: Arc<dyn ConsumerListener>,
        public_listener: Arc<dyn ConsumerPublicListener>,
    ) -> Self {
        Self {
            inner: Arc::new(ConsumerInner {
                id,
                local_id,
                producer_id,
                kind,
                track,
                rtp_parameters,
                app_data,
                closed: AtomicBool::new(false),
                listener,
                public_listener,
            }),
        }
    }

    /// Consumer id, assigned by the server
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Handler assigned receiver id
    pub fn local_id(&self) -> &str {
        &self.inner.local_id
    }

    /// Id of the remote producer being consumed
    pub fn producer_id(&self) -> &str {
        &self.inner.producer_id
    }

    pub fn kind(&self) -> MediaKind {
        self.inner.kind
    }

    pub fn track(&self) -> Arc<dyn MediaTrack> {
        Arc::clone(&self.inner.track)
    }

    pub fn rtp_parameters(&self) -> &RtpParameters {
        &self.inner.rtp_parameters
    }

    pub fn app_data(&self) -> &AppData {
        &self.inner.app_data
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn downgrade(&self) -> WeakConsumer {
        WeakConsumer {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Close the consumer and stop receiving. Idempotent.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("Closing consumer {}", self.inner.id);
        self.inner.listener.on_close(self).await;
    }

    pub(crate) fn transport_closed(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        debug!("Consumer {} closed by its transport", self.inner.id);
        self.inner.public_listener.on_transport_close(self);
    }

    /// Receiver stats
    pub async fn get_stats(&self) -> Result<StatsReport> {
        if self.is_closed() {
            return Err(Error::InvalidState(format!(
                "consumer {} closed",
                self.inner.id
            )));
        }
        self.inner.listener.on_get_stats(self).await
    }
}

/// Non-owning consumer reference held by the transport registry
#[derive(Clone)]
pub struct WeakConsumer {
    inner: Weak<ConsumerInner>,
}

impl WeakConsumer {
    pub fn upgrade(&self) -> Option<Consumer> {
        self.inner.upgrade().map(|inner| Consumer { inner })
    }

    /// Whether any `Consumer` handle is still held
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}
